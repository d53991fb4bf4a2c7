//! Condenses the gathered raw data into a `WorldState`.
//!
//! MCP tool results arrive as formatted text, so most of this module is
//! field extraction: "Key: Value" scanning for records and a JSON fragment
//! parse for the balance sheet report.

use chrono::{Duration, NaiveDate, Utc};
use serde_json::Value;

use crate::agents::gatherer::GatheredData;
use crate::agents::world_state::{
    BankAccount, OpenInvoice, PayrollRun, WorldState,
};
use crate::mcp::parse::{full_text, parse_invoice_content, record_texts};

const PAYROLL_KEYWORDS: &[&str] = &["payroll", "wages", "salary", "salaries", "pay run", "payrun"];

/// Value following `label` on any line of `text`.
fn extract_field(text: &str, label: &str) -> Option<String> {
    text.lines().find_map(|line| {
        line.trim()
            .strip_prefix(label)
            .map(|rest| rest.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

fn parse_amount(value: &str) -> f64 {
    value.replace(',', "").parse().unwrap_or(0.0)
}

pub struct SummarizationAgent;

impl SummarizationAgent {
    pub fn summarize(gathered: &GatheredData) -> WorldState {
        let mut state = WorldState::default();

        if let Some(org) = gathered.sources.get("organisation") {
            Self::summarize_organisation(org, &mut state);
        }
        state.as_of_date = Utc::now().to_rfc3339();

        Self::summarize_cash_position(gathered, &mut state);
        Self::summarize_ledgers(gathered, &mut state);
        Self::summarize_bank_history(gathered, &mut state);
        Self::summarize_journals(gathered, &mut state);
        Self::derive_payroll_profile(&mut state);

        for name in &gathered.completed {
            state.data_completeness.insert(name.clone(), true);
        }
        for name in &gathered.failed {
            state.data_completeness.insert(name.clone(), false);
        }
        state.data_quality.insert(
            "payroll_confidence".into(),
            state.payroll_profile.confidence.to_lowercase(),
        );

        for (name, value) in &gathered.sources {
            let records = record_texts(value).len();
            state
                .available_detail_slices
                .insert(name.clone(), serde_json::json!({"records": records}));
        }

        state
    }

    fn summarize_organisation(org: &Value, state: &mut WorldState) {
        let text = full_text(org);
        state.org_id = extract_field(&text, "Organisation ID:").unwrap_or_else(|| "unknown".into());
        state.org_name = extract_field(&text, "Name:").unwrap_or_else(|| "Unknown".into());
        if let Some(currency) = extract_field(&text, "Base Currency:") {
            state.base_currency = currency;
        }
        state.timezone = extract_field(&text, "Timezone:").unwrap_or_default();
    }

    fn summarize_cash_position(gathered: &GatheredData, state: &mut WorldState) {
        let currency = state.base_currency.clone();
        let cash = &mut state.cash_position;

        // Balance sheet: the report text embeds a JSON array of sections
        if let Some(balance_sheet) = gathered.sources.get("balance_sheet") {
            let text = full_text(balance_sheet);
            for section in bank_sections(&text) {
                for (name, balance) in section {
                    cash.bank_accounts.push(BankAccount {
                        name,
                        code: String::new(),
                        balance,
                        currency: currency.clone(),
                    });
                    cash.current_cash += balance;
                }
            }
        }

        // Accounts list: pick up bank accounts the report missed
        if let Some(accounts) = gathered.sources.get("accounts") {
            for text in record_texts(accounts) {
                let account_type = extract_field(text, "Type:").unwrap_or_default();
                if account_type != "BANK" && account_type != "CURRENT" {
                    continue;
                }
                let name = extract_field(text, "Account:")
                    .or_else(|| extract_field(text, "Name:"))
                    .unwrap_or_default();
                if name.is_empty() || cash.bank_accounts.iter().any(|a| a.name == name) {
                    continue;
                }
                cash.bank_accounts.push(BankAccount {
                    name,
                    code: extract_field(text, "Code:").unwrap_or_default(),
                    balance: 0.0,
                    currency: currency.clone(),
                });
            }
        }

        cash.last_update = Some(Utc::now().to_rfc3339());
    }

    fn summarize_ledgers(gathered: &GatheredData, state: &mut WorldState) {
        let Some(invoices) = gathered.sources.get("invoices") else {
            return;
        };

        for invoice in parse_invoice_content(invoices) {
            let amount_due = invoice["AmountDue"].as_f64().unwrap_or(0.0);
            if amount_due <= 0.0 {
                continue;
            }
            let profile = match invoice["Type"].as_str() {
                Some("ACCREC") => &mut state.ar_profile,
                Some("ACCPAY") => &mut state.ap_profile,
                _ => continue,
            };

            profile.total += amount_due;
            profile.total_count += 1;
            profile.largest_5.push(OpenInvoice {
                invoice_id: invoice["InvoiceID"]
                    .as_str()
                    .or_else(|| invoice["InvoiceNumber"].as_str())
                    .unwrap_or_default()
                    .to_string(),
                contact: invoice["Contact"]["Name"].as_str().unwrap_or_default().to_string(),
                amount: amount_due,
                due_date: invoice["DueDate"].as_str().map(String::from),
            });
        }

        for profile in [&mut state.ar_profile, &mut state.ap_profile] {
            profile
                .largest_5
                .sort_by(|a, b| b.amount.total_cmp(&a.amount));
            profile.largest_5.truncate(5);
        }
    }

    fn summarize_bank_history(gathered: &GatheredData, state: &mut WorldState) {
        let Some(transactions) = gathered.sources.get("bank_transactions") else {
            return;
        };
        let history = &mut state.bank_history;

        for text in record_texts(transactions) {
            let total = extract_field(text, "Total:")
                .map(|v| parse_amount(&v))
                .unwrap_or(0.0);
            let tx_type = extract_field(text, "Type:").unwrap_or_default();

            history.last_90_days_count += 1;
            if tx_type.contains("RECEIVE") {
                history.total_inflow += total;
            } else {
                history.total_outflow += total;
            }
        }
        history.net_flow = history.total_inflow - history.total_outflow;
        history.average_daily_flow = history.net_flow / 90.0;
    }

    fn summarize_journals(gathered: &GatheredData, state: &mut WorldState) {
        let Some(journals) = gathered.sources.get("manual_journals") else {
            return;
        };
        let profile = &mut state.journal_profile;

        for text in record_texts(journals) {
            let status = extract_field(text, "Status:").unwrap_or_default();
            match status.as_str() {
                "POSTED" => profile.total_posted += 1,
                "VOIDED" => profile.total_voided += 1,
                _ => {}
            }
            if status != "POSTED" {
                continue;
            }

            let narration = extract_field(text, "Narration:").unwrap_or_default();
            let lowered = narration.to_lowercase();
            if PAYROLL_KEYWORDS.iter().any(|k| lowered.contains(k)) {
                profile.payroll_journals.push(PayrollRun {
                    date: extract_field(text, "Date:").unwrap_or_default(),
                    amount: extract_field(text, "Total:")
                        .map(|v| parse_amount(&v))
                        .unwrap_or(0.0),
                    journal_id: extract_field(text, "Journal ID:").unwrap_or_default(),
                });
            } else {
                profile.other_journals_count += 1;
            }
        }
    }

    /// Derive cadence, next date, and expected amount from payroll journals.
    fn derive_payroll_profile(state: &mut WorldState) {
        let mut runs = state.journal_profile.payroll_journals.clone();
        runs.sort_by(|a, b| b.date.cmp(&a.date));

        let payroll = &mut state.payroll_profile;
        payroll.total_entries_found = runs.len();
        payroll.confidence = match runs.len() {
            0 => "Low".into(),
            1 | 2 => "Medium".into(),
            _ => "High".into(),
        };
        if runs.is_empty() {
            return;
        }

        payroll.expected_net_payroll = runs[0].amount;
        payroll.last_4_runs = runs.iter().take(4).cloned().collect();

        let dates: Vec<NaiveDate> = runs
            .iter()
            .filter_map(|r| NaiveDate::parse_from_str(&r.date, "%Y-%m-%d").ok())
            .collect();
        if dates.len() < 2 {
            return;
        }

        let gap_days = (dates[0] - dates[1]).num_days().abs();
        let (cadence, interval) = match gap_days {
            5..=9 => ("Weekly", 7),
            10..=18 => ("Bi-weekly", 14),
            19..=45 => ("Monthly", 30),
            _ => ("Unknown", 0),
        };
        payroll.cadence = cadence.into();
        if interval > 0 {
            payroll.next_payroll_date = Some(
                (dates[0] + Duration::days(interval)).format("%Y-%m-%d").to_string(),
            );
        }
    }
}

/// Bank sections of a balance sheet report: the text embeds a JSON array of
/// `{title, rows}` sections; rows carry `[name, balance]` cell pairs.
fn bank_sections(text: &str) -> Vec<Vec<(String, f64)>> {
    let Some(start) = text.find('[') else {
        return Vec::new();
    };
    let Some(end) = text.rfind(']') else {
        return Vec::new();
    };
    let Ok(sections) = serde_json::from_str::<Vec<Value>>(&text[start..=end]) else {
        return Vec::new();
    };

    sections
        .iter()
        .filter(|s| s["title"].as_str() == Some("Bank"))
        .map(|section| {
            section["rows"]
                .as_array()
                .into_iter()
                .flatten()
                .filter(|row| row["rowType"].as_str() == Some("Row"))
                .filter_map(|row| {
                    let cells = row["cells"].as_array()?;
                    if cells.len() < 2 {
                        return None;
                    }
                    let name = cells[0]["value"].as_str()?.to_string();
                    let balance: f64 = cells[1]["value"].as_str()?.parse().ok()?;
                    Some((name, balance))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn text_source(blocks: &[&str]) -> Value {
        let mut content = vec![json!({"type": "text", "text": "Found some records:"})];
        content.extend(blocks.iter().map(|b| json!({"type": "text", "text": b})));
        json!({"content": content})
    }

    fn gathered_with(sources: Vec<(&str, Value)>) -> GatheredData {
        let mut gathered = GatheredData {
            sources: HashMap::new(),
            completed: Vec::new(),
            failed: Vec::new(),
        };
        for (name, value) in sources {
            gathered.sources.insert(name.to_string(), value);
            gathered.completed.push(name.to_string());
        }
        gathered
    }

    #[test]
    fn extracts_organisation_fields() {
        let org = text_source(&[
            "Organisation ID: org-123\nName: Demo Co\nBase Currency: AUD\nTimezone: AUSEASTERNSTANDARDTIME",
        ]);
        let state = SummarizationAgent::summarize(&gathered_with(vec![("organisation", org)]));
        assert_eq!(state.org_id, "org-123");
        assert_eq!(state.org_name, "Demo Co");
        assert_eq!(state.base_currency, "AUD");
        assert_eq!(state.timezone, "AUSEASTERNSTANDARDTIME");
    }

    #[test]
    fn missing_organisation_falls_back_to_unknown() {
        let state = SummarizationAgent::summarize(&gathered_with(vec![]));
        assert_eq!(state.org_id, "");
        assert_eq!(state.base_currency, "USD");
    }

    #[test]
    fn balance_sheet_bank_section_feeds_cash_position() {
        let report = json!({
            "content": [{"type": "text", "text": format!(
                "Balance Sheet\n{}",
                json!([
                    {"title": "Bank", "rows": [
                        {"rowType": "Row", "cells": [{"value": "Business Account"}, {"value": "5000.50"}]},
                        {"rowType": "SummaryRow", "cells": [{"value": "Total"}, {"value": "5000.50"}]}
                    ]},
                    {"title": "Equity", "rows": []}
                ])
            )}]
        });
        let state =
            SummarizationAgent::summarize(&gathered_with(vec![("balance_sheet", report)]));
        assert_eq!(state.cash_position.current_cash, 5000.50);
        assert_eq!(state.cash_position.bank_accounts.len(), 1);
        assert_eq!(state.cash_position.bank_accounts[0].name, "Business Account");
    }

    #[test]
    fn invoices_split_into_ar_and_ap() {
        let invoices = text_source(&[
            "Invoice: INV-1\nType: ACCREC\nContact: Acme (c-1)\nAmount Due: 900.00\nDue Date: 2026-09-10",
            "Invoice: INV-2\nType: ACCREC\nContact: Beta (c-2)\nAmount Due: 100.00",
            "Invoice: BILL-1\nType: ACCPAY\nContact: Supplier (c-3)\nAmount Due: 400.00",
            "Invoice: INV-3\nType: ACCREC\nContact: Paid Up (c-4)\nAmount Due: 0.00",
        ]);
        let state = SummarizationAgent::summarize(&gathered_with(vec![("invoices", invoices)]));

        assert_eq!(state.ar_profile.total, 1000.0);
        assert_eq!(state.ar_profile.total_count, 2);
        assert_eq!(state.ar_profile.largest_5[0].contact, "Acme");
        assert_eq!(state.ap_profile.total, 400.0);
        assert_eq!(state.ap_profile.total_count, 1);
    }

    #[test]
    fn bank_history_nets_inflow_against_outflow() {
        let transactions = text_source(&[
            "Type: RECEIVE\nTotal: 1,000.00",
            "Type: SPEND\nTotal: 300.00",
            "Type: SPEND\nTotal: 200.00",
        ]);
        let state =
            SummarizationAgent::summarize(&gathered_with(vec![("bank_transactions", transactions)]));
        assert_eq!(state.bank_history.last_90_days_count, 3);
        assert_eq!(state.bank_history.total_inflow, 1000.0);
        assert_eq!(state.bank_history.total_outflow, 500.0);
        assert_eq!(state.bank_history.net_flow, 500.0);
    }

    #[test]
    fn payroll_journals_drive_the_payroll_profile() {
        let journals = text_source(&[
            "Journal ID: j-3\nDate: 2026-08-28\nStatus: POSTED\nNarration: Monthly payroll\nTotal: 42,000.00",
            "Journal ID: j-2\nDate: 2026-07-28\nStatus: POSTED\nNarration: Monthly payroll\nTotal: 41,500.00",
            "Journal ID: j-1\nDate: 2026-06-28\nStatus: POSTED\nNarration: Monthly payroll\nTotal: 41,000.00",
            "Journal ID: j-0\nDate: 2026-06-15\nStatus: POSTED\nNarration: Depreciation\nTotal: 2,000.00",
            "Journal ID: j-x\nDate: 2026-06-01\nStatus: VOIDED\nNarration: Payroll correction\nTotal: 100.00",
        ]);
        let state =
            SummarizationAgent::summarize(&gathered_with(vec![("manual_journals", journals)]));

        assert_eq!(state.journal_profile.payroll_journals.len(), 3);
        assert_eq!(state.journal_profile.other_journals_count, 1);
        assert_eq!(state.journal_profile.total_posted, 4);
        assert_eq!(state.journal_profile.total_voided, 1);

        let payroll = &state.payroll_profile;
        assert_eq!(payroll.expected_net_payroll, 42_000.0);
        assert_eq!(payroll.cadence, "Monthly");
        assert_eq!(payroll.confidence, "High");
        assert_eq!(payroll.next_payroll_date.as_deref(), Some("2026-09-27"));
    }

    #[test]
    fn single_payroll_run_gives_medium_confidence_no_cadence() {
        let journals = text_source(&[
            "Journal ID: j-1\nDate: 2026-08-01\nStatus: POSTED\nNarration: Wages\nTotal: 9,000.00",
        ]);
        let state =
            SummarizationAgent::summarize(&gathered_with(vec![("manual_journals", journals)]));
        assert_eq!(state.payroll_profile.confidence, "Medium");
        assert_eq!(state.payroll_profile.cadence, "Unknown");
        assert_eq!(state.payroll_profile.next_payroll_date, None);
    }

    #[test]
    fn completeness_map_reflects_gather_outcome() {
        let mut gathered = gathered_with(vec![("organisation", text_source(&["Name: X"]))]);
        gathered.failed.push("invoices".into());
        let state = SummarizationAgent::summarize(&gathered);
        assert_eq!(state.data_completeness.get("organisation"), Some(&true));
        assert_eq!(state.data_completeness.get("invoices"), Some(&false));
    }
}
