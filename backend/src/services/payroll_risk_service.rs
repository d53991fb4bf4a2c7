//! Payroll risk analysis rows: lifecycle and progress tracking.
//!
//! An analysis is created in `running` state; the background agent updates
//! progress as it works and finishes the row with either a result payload
//! (`completed`) or an error message (`failed`).

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::payroll_risk::{AnalysisStatus, PayrollRiskAnalysis, PayrollRiskAnalysisSummary};

const SUMMARY_COLUMNS: &str = "id, organization_id, connection_id, connection_name, tenant_id, \
     tenant_name, status, initiated_at, completed_at, progress, progress_message";

pub struct PayrollRiskService {
    db: PgPool,
}

impl PayrollRiskService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        organization_id: Uuid,
        connection_id: Uuid,
        connection_name: Option<&str>,
        tenant_id: &str,
        tenant_name: Option<&str>,
    ) -> Result<PayrollRiskAnalysis> {
        let row = sqlx::query_as::<_, PayrollRiskAnalysis>(
            r#"
            INSERT INTO payroll_risk_analyses
                (organization_id, connection_id, connection_name, tenant_id, tenant_name,
                 status, progress, progress_message)
            VALUES ($1, $2, $3, $4, $5, 'running', 0, 'Starting analysis')
            RETURNING *
            "#,
        )
        .bind(organization_id)
        .bind(connection_id)
        .bind(connection_name)
        .bind(tenant_id)
        .bind(tenant_name)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: Uuid, organization_id: Uuid) -> Result<PayrollRiskAnalysis> {
        sqlx::query_as::<_, PayrollRiskAnalysis>(
            "SELECT * FROM payroll_risk_analyses WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Analysis {id} not found")))
    }

    pub async fn list(
        &self,
        organization_id: Uuid,
        connection_id: Option<Uuid>,
        status: Option<AnalysisStatus>,
        limit: i64,
    ) -> Result<Vec<PayrollRiskAnalysisSummary>> {
        let rows = sqlx::query_as::<_, PayrollRiskAnalysisSummary>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM payroll_risk_analyses \
             WHERE organization_id = $1 \
               AND ($2::uuid IS NULL OR connection_id = $2) \
               AND ($3::varchar IS NULL OR status = $3) \
             ORDER BY initiated_at DESC LIMIT $4"
        ))
        .bind(organization_id)
        .bind(connection_id)
        .bind(status)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn update_progress(&self, id: Uuid, progress: i32, message: &str) -> Result<()> {
        let progress = progress.clamp(0, 100);
        sqlx::query(
            "UPDATE payroll_risk_analyses SET progress = $2, progress_message = $3 \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(progress)
        .bind(message)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn complete(&self, id: Uuid, result: &serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payroll_risk_analyses
            SET status = 'completed', result = $2, progress = 100,
                progress_message = 'Analysis complete', completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(result)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn fail(&self, id: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payroll_risk_analyses
            SET status = 'failed', error_message = $2,
                progress_message = 'Analysis failed', completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid, organization_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM payroll_risk_analyses WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(organization_id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Analysis {id} not found")));
        }
        Ok(())
    }

    /// Mark runs stuck in `running` past `max_age` as failed. A run stays
    /// stuck when the process died mid-analysis; without this the UI would
    /// poll it forever.
    pub async fn fail_stale_running(&self, max_age: Duration) -> Result<u64> {
        let cutoff: DateTime<Utc> = Utc::now() - max_age;
        let result = sqlx::query(
            r#"
            UPDATE payroll_risk_analyses
            SET status = 'failed',
                error_message = 'Analysis timed out',
                progress_message = 'Analysis failed',
                completed_at = NOW()
            WHERE status = 'running' AND initiated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_by_status(&self, organization_id: Uuid, status: AnalysisStatus) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM payroll_risk_analyses WHERE organization_id = $1 AND status = $2",
        )
        .bind(organization_id)
        .bind(status.as_str())
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }
}
