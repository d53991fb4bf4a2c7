//! Payroll risk analysis persistence model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Running,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Running => "running",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PayrollRiskAnalysis {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub connection_id: Uuid,
    pub connection_name: Option<String>,
    pub tenant_id: String,
    pub tenant_name: Option<String>,
    pub status: AnalysisStatus,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Full `PayrollRiskResult` as JSON once the run completes.
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// 0..=100
    pub progress: i32,
    pub progress_message: Option<String>,
}

/// Compact listing row; omits the full result payload.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PayrollRiskAnalysisSummary {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub connection_id: Uuid,
    pub connection_name: Option<String>,
    pub tenant_id: String,
    pub tenant_name: Option<String>,
    pub status: AnalysisStatus,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: i32,
    pub progress_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AnalysisStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(AnalysisStatus::Failed.as_str(), "failed");
    }
}
