//! Final assessment step: hand the world state to the LLM and shape its
//! answer into a `PayrollRiskResult`.

use chrono::Utc;

use crate::agents::gatherer::GatheredData;
use crate::agents::planner::PlannerDecision;
use crate::agents::result::PayrollRiskResult;
use crate::agents::world_state::WorldState;
use crate::clients::llm::LlmEngine;
use crate::error::{AppError, Result};

const SYSTEM_PROMPT: &str = "You are a payroll risk analyst. Using the financial world \
state provided, assess whether the organization can cover its next payroll. \
Respond with a single JSON object matching the requested schema exactly.";

pub struct AssessmentEngine<'a> {
    llm: &'a dyn LlmEngine,
}

impl<'a> AssessmentEngine<'a> {
    pub fn new(llm: &'a dyn LlmEngine) -> Self {
        Self { llm }
    }

    pub async fn assess(
        &self,
        world_state: &WorldState,
        gathered: &GatheredData,
        planner: &PlannerDecision,
    ) -> Result<PayrollRiskResult> {
        let prompt = build_assessment_prompt(world_state, planner)?;
        let response = self.llm.complete_json(SYSTEM_PROMPT, &prompt).await?;

        let mut result: PayrollRiskResult =
            serde_json::from_value(response).map_err(|e| {
                AppError::Upstream(format!("LLM assessment did not match schema: {e}"))
            })?;

        // Server-owned fields win over whatever the model emitted
        result.org_id = world_state.org_id.clone();
        result.as_of_utc = Utc::now().to_rfc3339();
        result.data_completeness_score = gathered.completeness_score();
        result.used_endpoints = gathered.completed.clone();
        let missing = gathered.failed.clone();
        if !missing.is_empty() {
            result
                .warnings
                .push(format!("Data sources unavailable: {}", missing.join(", ")));
            result.missing_data = Some(missing);
        }
        result.normalize();
        Ok(result)
    }
}

fn build_assessment_prompt(
    world_state: &WorldState,
    planner: &PlannerDecision,
) -> Result<String> {
    Ok(format!(
        r#"**World State:**
{world_json}

**Planner Assessment:**
{planner_reasoning}

Produce the payroll risk assessment as a JSON object with exactly this shape:
{{
  "payroll_date": "YYYY-MM-DD",
  "payroll_amount_net": 0,
  "payroll_employer_costs": null,
  "payroll_amount_with_buffer": 0,
  "current_cash_available": 0,
  "projected_cash_on_payroll_date": 0,
  "payroll_coverage_ratio": 0,
  "health_status": "Red",
  "near_miss": false,
  "detection_tier": 4,
  "detection_confidence": "{confidence}",
  "forecast_confidence": 0,
  "data_completeness_score": 0,
  "key_risk_drivers": ["List any issues"],
  "assumptions": ["List assumptions"],
  "scenarios": {{
    "base": {{"projected_cash": 0, "coverage_ratio": 0}},
    "optimistic": {{"projected_cash": 0, "coverage_ratio": 0}},
    "pessimistic": {{"projected_cash": 0, "coverage_ratio": 0}}
  }},
  "evidence": {{"bank_transactions": [], "bank_transfers": [], "invoices_ar": [], "bills_ap": [], "credit_notes": [], "journals": [], "payroll_objects": [], "report_refs": [], "fx_rates": []}},
  "used_endpoints": [],
  "warnings": ["Explain any errors or missing data here"],
  "missing_data": ["List missing data sources"],
  "recommended_actions": ["List actions"],
  "advisory_narrative": "Explain the situation in at most 140 words"
}}

Rules:
- health_status: "Green" when coverage >= 1.20, "Yellow" from 1.00 to 1.19, "Red" below 1.00
- near_miss: true only when coverage is between 1.00 and 1.05
- Use the base currency from the world state for all amounts
- Every figure must trace back to the world state; never invent numbers"#,
        world_json = world_state.to_summary_json()?,
        planner_reasoning = planner.reasoning,
        confidence = world_state.payroll_profile.confidence,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::result::HealthStatus;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    struct CannedEngine(String);

    #[async_trait]
    impl LlmEngine for CannedEngine {
        fn engine_name(&self) -> &'static str {
            "canned"
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn gathered() -> GatheredData {
        GatheredData {
            sources: HashMap::new(),
            completed: vec!["organisation".into(), "accounts".into(), "invoices".into()],
            failed: vec!["trial_balance".into()],
        }
    }

    #[tokio::test]
    async fn assessment_is_normalized_and_stamped() {
        let engine = CannedEngine(
            json!({
                "payroll_date": "2026-09-27",
                "payroll_amount_net": 42000.0,
                "payroll_coverage_ratio": 1.02,
                "health_status": "Green",
                "near_miss": false,
                "advisory_narrative": "Tight but covered."
            })
            .to_string(),
        );

        let mut state = WorldState::default();
        state.org_id = "org-1".into();

        let result = AssessmentEngine::new(&engine)
            .assess(&state, &gathered(), &PlannerDecision::proceed("ok"))
            .await
            .unwrap();

        // Classification is recomputed from the ratio, not trusted
        assert_eq!(result.health_status, HealthStatus::Yellow);
        assert!(result.near_miss);
        assert_eq!(result.org_id, "org-1");
        assert_eq!(result.data_completeness_score, 75);
        assert_eq!(result.missing_data, Some(vec!["trial_balance".into()]));
        assert!(result.warnings.iter().any(|w| w.contains("trial_balance")));
    }

    #[tokio::test]
    async fn unparseable_answer_is_an_upstream_error() {
        let engine = CannedEngine("not even json".into());
        let err = AssessmentEngine::new(&engine)
            .assess(
                &WorldState::default(),
                &gathered(),
                &PlannerDecision::proceed("ok"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
