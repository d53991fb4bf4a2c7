//! LLM-backed planning step: decide whether the world state is sufficient
//! for a confident assessment or whether detail slices should be pulled.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::world_state::WorldState;
use crate::clients::llm::LlmEngine;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRequest {
    /// "invoices_ar", "invoices_ap", "bank_transactions" or "manual_journals"
    pub slice_type: String,
    #[serde(default)]
    pub filter_criteria: Value,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerDecision {
    pub need_more_data: bool,
    #[serde(default)]
    pub requests: Vec<DataRequest>,
    pub can_proceed: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl PlannerDecision {
    /// The conservative default: proceed with what we have. Used whenever
    /// the LLM call or its output cannot be used.
    pub fn proceed(reason: impl Into<String>) -> Self {
        Self {
            need_more_data: false,
            requests: Vec::new(),
            can_proceed: true,
            reasoning: reason.into(),
        }
    }
}

pub struct RiskPlanner<'a> {
    engine: &'a dyn LlmEngine,
}

impl<'a> RiskPlanner<'a> {
    pub fn new(engine: &'a dyn LlmEngine) -> Self {
        Self { engine }
    }

    pub async fn plan(&self, world_state: &WorldState) -> Result<PlannerDecision> {
        let prompt = match build_planning_prompt(world_state) {
            Ok(p) => p,
            Err(e) => return Ok(PlannerDecision::proceed(format!("Planning error: {e}"))),
        };

        match self.engine.complete_json(SYSTEM_PROMPT, &prompt).await {
            Ok(response) => Ok(parse_decision(&response)),
            Err(e) => {
                tracing::warn!("Planner LLM call failed: {}", e);
                Ok(PlannerDecision::proceed(format!(
                    "Planning error: {e}. Proceeding with available data."
                )))
            }
        }
    }
}

const SYSTEM_PROMPT: &str = "You are a Risk Planner Agent for payroll risk analysis. \
Determine if the available data supports a confident payroll risk assessment \
or if specific detail slices are needed first. Respond with a JSON object.";

fn build_planning_prompt(world_state: &WorldState) -> Result<String> {
    Ok(format!(
        r#"**Current World State Summary:**

Organization: {org_name} ({org_id})
Base Currency: {currency}
As of Date: {as_of}

**Cash Position:**
- Current Cash: {cash:.2} {currency}
- Bank Accounts: {bank_accounts}

**Payroll Profile:**
- Cadence: {cadence}
- Next Payroll Date: {next_payroll}
- Expected Net Payroll: {net_payroll:.2} {currency}
- Confidence: {confidence}
- Total Entries Found: {entries}

**Accounts Receivable:**
- Total AR: {ar_total:.2} {currency}
- Total Count: {ar_count}

**Accounts Payable:**
- Total AP: {ap_total:.2} {currency}
- Total Count: {ap_count}

**Bank History (Last 90 Days):**
- Transactions: {tx_count}
- Net Flow: {net_flow:.2} {currency}

**Full World State:**
{world_json}

Respond with a JSON object:
{{
  "need_more_data": true or false,
  "requests": [{{"slice_type": "...", "filter_criteria": {{}}, "reason": "..."}}],
  "can_proceed": true or false,
  "reasoning": "..."
}}"#,
        org_name = world_state.org_name,
        org_id = world_state.org_id,
        currency = world_state.base_currency,
        as_of = world_state.as_of_date,
        cash = world_state.cash_position.current_cash,
        bank_accounts = world_state.cash_position.bank_accounts.len(),
        cadence = world_state.payroll_profile.cadence,
        next_payroll = world_state
            .payroll_profile
            .next_payroll_date
            .as_deref()
            .unwrap_or("Unknown"),
        net_payroll = world_state.payroll_profile.expected_net_payroll,
        confidence = world_state.payroll_profile.confidence,
        entries = world_state.payroll_profile.total_entries_found,
        ar_total = world_state.ar_profile.total,
        ar_count = world_state.ar_profile.total_count,
        ap_total = world_state.ap_profile.total,
        ap_count = world_state.ap_profile.total_count,
        tx_count = world_state.bank_history.last_90_days_count,
        net_flow = world_state.bank_history.net_flow,
        world_json = world_state.to_summary_json()?,
    ))
}

fn parse_decision(response: &Value) -> PlannerDecision {
    match serde_json::from_value::<PlannerDecision>(response.clone()) {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!("Could not parse planner response: {}", e);
            PlannerDecision::proceed(format!(
                "Could not parse planner response: {e}. Proceeding with available data."
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use async_trait::async_trait;
    use serde_json::json;

    struct CannedEngine {
        response: std::result::Result<String, ()>,
    }

    #[async_trait]
    impl LlmEngine for CannedEngine {
        fn engine_name(&self) -> &'static str {
            "canned"
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            self.response
                .clone()
                .map_err(|_| AppError::Upstream("engine down".into()))
        }
    }

    #[tokio::test]
    async fn well_formed_response_is_parsed() {
        let engine = CannedEngine {
            response: Ok(json!({
                "need_more_data": true,
                "requests": [{"slice_type": "invoices_ar", "filter_criteria": {"top_n": 5}, "reason": "AR is large"}],
                "can_proceed": false,
                "reasoning": "Need AR detail"
            })
            .to_string()),
        };
        let decision = RiskPlanner::new(&engine)
            .plan(&WorldState::default())
            .await
            .unwrap();
        assert!(decision.need_more_data);
        assert!(!decision.can_proceed);
        assert_eq!(decision.requests.len(), 1);
        assert_eq!(decision.requests[0].slice_type, "invoices_ar");
    }

    #[tokio::test]
    async fn engine_failure_falls_back_to_proceed() {
        let engine = CannedEngine { response: Err(()) };
        let decision = RiskPlanner::new(&engine)
            .plan(&WorldState::default())
            .await
            .unwrap();
        assert!(decision.can_proceed);
        assert!(!decision.need_more_data);
        assert!(decision.reasoning.contains("Planning error"));
    }

    #[tokio::test]
    async fn malformed_json_falls_back_to_proceed() {
        let engine = CannedEngine {
            response: Ok(r#"{"need_more_data": "definitely maybe"}"#.into()),
        };
        let decision = RiskPlanner::new(&engine)
            .plan(&WorldState::default())
            .await
            .unwrap();
        assert!(decision.can_proceed);
        assert!(decision.reasoning.contains("Proceeding with available data"));
    }

    #[test]
    fn prompt_embeds_world_state() {
        let mut state = WorldState::default();
        state.org_name = "Demo Co".into();
        state.cash_position.current_cash = 1234.5;
        let prompt = build_planning_prompt(&state).unwrap();
        assert!(prompt.contains("Demo Co"));
        assert!(prompt.contains("1234.50"));
        assert!(prompt.contains("need_more_data"));
    }
}
