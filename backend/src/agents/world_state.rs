//! Condensed view of an organization's finances, built by the summarizer and
//! consumed by the planner and the final assessment prompt.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankAccount {
    pub name: String,
    #[serde(default)]
    pub code: String,
    pub balance: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CashPosition {
    pub current_cash: f64,
    pub bank_accounts: Vec<BankAccount>,
    pub last_update: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollRun {
    pub date: String,
    pub amount: f64,
    pub journal_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollProfile {
    /// "Weekly", "Bi-weekly", "Monthly" or "Unknown"
    pub cadence: String,
    pub next_payroll_date: Option<String>,
    pub expected_net_payroll: f64,
    pub employer_costs: Option<f64>,
    pub last_4_runs: Vec<PayrollRun>,
    pub total_entries_found: usize,
    /// "High", "Medium" or "Low"
    pub confidence: String,
}

impl Default for PayrollProfile {
    fn default() -> Self {
        Self {
            cadence: "Unknown".into(),
            next_payroll_date: None,
            expected_net_payroll: 0.0,
            employer_costs: None,
            last_4_runs: Vec::new(),
            total_entries_found: 0,
            confidence: "Low".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenInvoice {
    pub invoice_id: String,
    pub contact: String,
    pub amount: f64,
    pub due_date: Option<String>,
}

/// Receivables or payables, depending on which side it sits on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerProfile {
    pub total: f64,
    pub due_before_payroll: f64,
    pub largest_5: Vec<OpenInvoice>,
    pub total_count: usize,
    /// Keyed by bucket label, e.g. "0-30", "31-60".
    pub aged_buckets: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankHistoryProfile {
    pub last_90_days_count: usize,
    pub total_inflow: f64,
    pub total_outflow: f64,
    pub net_flow: f64,
    pub average_daily_flow: f64,
    pub bank_fees_total: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalProfile {
    /// POSTED journals that look like payroll.
    pub payroll_journals: Vec<PayrollRun>,
    pub other_journals_count: usize,
    pub total_posted: usize,
    pub total_voided: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    pub org_id: String,
    pub org_name: String,
    pub base_currency: String,
    pub timezone: String,
    pub as_of_date: String,

    pub cash_position: CashPosition,
    pub payroll_profile: PayrollProfile,
    pub ar_profile: LedgerProfile,
    pub ap_profile: LedgerProfile,
    pub bank_history: BankHistoryProfile,
    pub journal_profile: JournalProfile,

    /// Which sources the gatherer completed.
    pub data_completeness: BTreeMap<String, bool>,
    /// Free-form quality notes, e.g. payroll_confidence.
    pub data_quality: BTreeMap<String, String>,
    /// Detail slices the planner may request.
    pub available_detail_slices: BTreeMap<String, serde_json::Value>,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            org_id: String::new(),
            org_name: String::new(),
            base_currency: "USD".into(),
            timezone: String::new(),
            as_of_date: String::new(),
            cash_position: CashPosition::default(),
            payroll_profile: PayrollProfile::default(),
            ar_profile: LedgerProfile::default(),
            ap_profile: LedgerProfile::default(),
            bank_history: BankHistoryProfile::default(),
            journal_profile: JournalProfile::default(),
            data_completeness: BTreeMap::new(),
            data_quality: BTreeMap::new(),
            available_detail_slices: BTreeMap::new(),
        }
    }
}

impl WorldState {
    /// Pretty JSON for prompt embedding.
    pub fn to_summary_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
