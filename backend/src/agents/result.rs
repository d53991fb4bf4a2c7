//! Payroll risk assessment output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MODEL_VERSION: &str = "1.0.0";

/// Traffic-light classification of payroll coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

impl HealthStatus {
    /// Green when coverage is at least 1.20, Yellow from 1.00, Red below.
    pub fn from_coverage(ratio: f64) -> Self {
        if ratio >= 1.20 {
            HealthStatus::Green
        } else if ratio >= 1.00 {
            HealthStatus::Yellow
        } else {
            HealthStatus::Red
        }
    }

    /// A near miss is coverage between 1.00 and 1.05: payroll clears, barely.
    pub fn is_near_miss(ratio: f64) -> bool {
        (1.00..=1.05).contains(&ratio)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Red
    }
}

/// How the payroll figures were detected, strongest source first.
/// 0 = provider payroll data, 1 = GL journals, 2 = known payroll providers,
/// 3 = recurring patterns, 4 = statistical inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(into = "u8", try_from = "u8")]
pub enum DetectionTier {
    Tier0,
    Tier1,
    Tier2,
    Tier3,
    Tier4,
}

impl Default for DetectionTier {
    fn default() -> Self {
        DetectionTier::Tier4
    }
}

impl From<DetectionTier> for u8 {
    fn from(tier: DetectionTier) -> u8 {
        match tier {
            DetectionTier::Tier0 => 0,
            DetectionTier::Tier1 => 1,
            DetectionTier::Tier2 => 2,
            DetectionTier::Tier3 => 3,
            DetectionTier::Tier4 => 4,
        }
    }
}

impl TryFrom<u8> for DetectionTier {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(DetectionTier::Tier0),
            1 => Ok(DetectionTier::Tier1),
            2 => Ok(DetectionTier::Tier2),
            3 => Ok(DetectionTier::Tier3),
            4 => Ok(DetectionTier::Tier4),
            other => Err(format!("Unknown detection tier {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Scenario {
    pub projected_cash: f64,
    pub coverage_ratio: f64,
}

/// References back into the provider data supporting the assessment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Evidence {
    pub bank_transactions: Vec<String>,
    pub bank_transfers: Vec<String>,
    pub invoices_ar: Vec<String>,
    pub bills_ap: Vec<String>,
    pub credit_notes: Vec<String>,
    pub journals: Vec<String>,
    pub payroll_objects: Vec<String>,
    pub report_refs: Vec<String>,
    pub fx_rates: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PayrollRiskResult {
    pub model_version: String,
    pub org_id: String,
    pub as_of_utc: String,

    pub payroll_date: String,
    pub payroll_amount_net: f64,
    pub payroll_employer_costs: Option<f64>,
    pub payroll_amount_with_buffer: f64,

    pub current_cash_available: f64,
    pub projected_cash_on_payroll_date: f64,
    pub payroll_coverage_ratio: f64,

    pub health_status: HealthStatus,
    pub near_miss: bool,

    pub detection_tier: DetectionTier,
    /// High | Medium | Low | VeryLow
    pub detection_confidence: String,
    /// 0..=100
    pub forecast_confidence: i32,
    /// 0..=100
    pub data_completeness_score: i32,

    pub key_risk_drivers: Vec<String>,
    pub assumptions: Vec<String>,
    /// Keyed "base", "optimistic", "pessimistic".
    pub scenarios: BTreeMap<String, Scenario>,

    pub evidence: Evidence,
    pub used_endpoints: Vec<String>,
    pub warnings: Vec<String>,
    pub missing_data: Option<Vec<String>>,

    pub recommended_actions: Vec<String>,
    /// At most 140 words.
    pub advisory_narrative: String,
}

impl Default for PayrollRiskResult {
    fn default() -> Self {
        Self {
            model_version: MODEL_VERSION.into(),
            org_id: String::new(),
            as_of_utc: String::new(),
            payroll_date: String::new(),
            payroll_amount_net: 0.0,
            payroll_employer_costs: None,
            payroll_amount_with_buffer: 0.0,
            current_cash_available: 0.0,
            projected_cash_on_payroll_date: 0.0,
            payroll_coverage_ratio: 0.0,
            health_status: HealthStatus::default(),
            near_miss: false,
            detection_tier: DetectionTier::default(),
            detection_confidence: "VeryLow".into(),
            forecast_confidence: 0,
            data_completeness_score: 0,
            key_risk_drivers: Vec::new(),
            assumptions: Vec::new(),
            scenarios: BTreeMap::new(),
            evidence: Evidence::default(),
            used_endpoints: Vec::new(),
            warnings: Vec::new(),
            missing_data: None,
            recommended_actions: Vec::new(),
            advisory_narrative: String::new(),
        }
    }
}

impl PayrollRiskResult {
    /// Re-derive the classification fields from the coverage ratio. The LLM
    /// fills them in, but the thresholds are enforced here so its arithmetic
    /// mistakes cannot flip a status.
    pub fn normalize(&mut self) {
        self.health_status = HealthStatus::from_coverage(self.payroll_coverage_ratio);
        self.near_miss = HealthStatus::is_near_miss(self.payroll_coverage_ratio);
        self.forecast_confidence = self.forecast_confidence.clamp(0, 100);
        self.data_completeness_score = self.data_completeness_score.clamp(0, 100);
        self.model_version = MODEL_VERSION.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_thresholds() {
        assert_eq!(HealthStatus::from_coverage(1.50), HealthStatus::Green);
        assert_eq!(HealthStatus::from_coverage(1.20), HealthStatus::Green);
        assert_eq!(HealthStatus::from_coverage(1.19), HealthStatus::Yellow);
        assert_eq!(HealthStatus::from_coverage(1.00), HealthStatus::Yellow);
        assert_eq!(HealthStatus::from_coverage(0.99), HealthStatus::Red);
        assert_eq!(HealthStatus::from_coverage(0.0), HealthStatus::Red);
    }

    #[test]
    fn near_miss_band() {
        assert!(!HealthStatus::is_near_miss(0.99));
        assert!(HealthStatus::is_near_miss(1.00));
        assert!(HealthStatus::is_near_miss(1.05));
        assert!(!HealthStatus::is_near_miss(1.06));
    }

    #[test]
    fn detection_tier_round_trips_as_integer() {
        let json = serde_json::to_string(&DetectionTier::Tier2).unwrap();
        assert_eq!(json, "2");
        let tier: DetectionTier = serde_json::from_str("4").unwrap();
        assert_eq!(tier, DetectionTier::Tier4);
        assert!(serde_json::from_str::<DetectionTier>("7").is_err());
    }

    #[test]
    fn normalize_overrides_llm_classification() {
        let mut result = PayrollRiskResult {
            payroll_coverage_ratio: 1.02,
            health_status: HealthStatus::Red,
            near_miss: false,
            forecast_confidence: 250,
            ..Default::default()
        };
        result.normalize();
        assert_eq!(result.health_status, HealthStatus::Yellow);
        assert!(result.near_miss);
        assert_eq!(result.forecast_confidence, 100);
    }

    #[test]
    fn deserializes_partial_llm_output() {
        let json = r#"{
            "payroll_coverage_ratio": 1.3,
            "health_status": "Green",
            "advisory_narrative": "All clear."
        }"#;
        let result: PayrollRiskResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.payroll_coverage_ratio, 1.3);
        assert_eq!(result.model_version, MODEL_VERSION);
        assert_eq!(result.detection_tier, DetectionTier::Tier4);
    }
}
