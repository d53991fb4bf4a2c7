//! Pulls every data source the risk assessment needs through the MCP client,
//! caching results so re-runs against the same tenant stay cheap.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::mcp::client::McpClient;
use crate::mcp::parse::{record_texts, PAGE_SIZE};
use crate::services::cache_service::{CacheService, McpCacheStore};

/// One source to gather: key, MCP tool name, whether it pages.
pub struct SourceSpec {
    pub name: &'static str,
    pub tool: &'static str,
    pub paginated: bool,
}

/// Everything the assessment draws on. Order matters only for progress.
pub const DATA_SOURCES: &[SourceSpec] = &[
    SourceSpec { name: "organisation", tool: "list-organisation-details", paginated: false },
    SourceSpec { name: "accounts", tool: "list-accounts", paginated: false },
    SourceSpec { name: "bank_transactions", tool: "list-bank-transactions", paginated: true },
    SourceSpec { name: "manual_journals", tool: "list-manual-journals", paginated: false },
    SourceSpec { name: "invoices", tool: "list-invoices", paginated: true },
    SourceSpec { name: "payments", tool: "list-payments", paginated: true },
    SourceSpec { name: "credit_notes", tool: "list-credit-notes", paginated: true },
    SourceSpec { name: "balance_sheet", tool: "list-report-balance-sheet", paginated: false },
    SourceSpec { name: "profit_loss", tool: "list-profit-and-loss", paginated: false },
    SourceSpec { name: "trial_balance", tool: "list-trial-balance", paginated: false },
    SourceSpec { name: "contacts", tool: "list-contacts", paginated: true },
];

/// Sources the assessment cannot run without.
pub const CRITICAL_SOURCES: &[&str] = &["organisation", "accounts"];

/// Pagination safety limit.
const MAX_PAGES: u32 = 100;
/// Aged reports are fetched per contact; cap how many contacts we walk.
const MAX_AGED_CONTACTS: usize = 20;
/// Database cache rows younger than this are reused.
const CACHE_MAX_AGE_MINUTES: i64 = 60;

#[derive(Debug, Default)]
pub struct GatheredData {
    pub sources: HashMap<String, Value>,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
}

impl GatheredData {
    /// Percentage of sources that came back, 0..=100.
    pub fn completeness_score(&self) -> i32 {
        let total = self.completed.len() + self.failed.len();
        if total == 0 {
            return 0;
        }
        ((self.completed.len() * 100) / total) as i32
    }

    /// Critical sources that failed to gather.
    pub fn missing_critical(&self) -> Vec<&'static str> {
        CRITICAL_SOURCES
            .iter()
            .filter(|name| !self.sources.contains_key(**name))
            .copied()
            .collect()
    }
}

/// Where gathered data is cached between runs.
pub struct CacheContext {
    pub memory: Arc<CacheService>,
    pub store: McpCacheStore,
    pub organization_id: Uuid,
    pub connection_id: Uuid,
    pub tenant_id: String,
}

impl CacheContext {
    async fn get(&self, cache_key: &str) -> Option<Value> {
        let memory_key =
            CacheService::mcp_key(self.connection_id, &self.tenant_id, cache_key);
        if let Some(value) = self.memory.mcp.get(&memory_key) {
            return Some(value);
        }
        match self
            .store
            .get(
                self.connection_id,
                &self.tenant_id,
                cache_key,
                chrono::Duration::minutes(CACHE_MAX_AGE_MINUTES),
            )
            .await
        {
            Ok(Some(row)) => {
                self.memory.mcp.put(memory_key, row.data.clone());
                Some(row.data)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", cache_key, e);
                None
            }
        }
    }

    async fn put(&self, cache_key: &str, value: &Value) {
        let memory_key =
            CacheService::mcp_key(self.connection_id, &self.tenant_id, cache_key);
        self.memory.mcp.put(memory_key, value.clone());
        if let Err(e) = self
            .store
            .put(
                self.organization_id,
                self.connection_id,
                &self.tenant_id,
                cache_key,
                value,
            )
            .await
        {
            tracing::warn!("Cache write failed for {}: {}", cache_key, e);
        }
    }
}

pub struct DataGatherer {
    cache: Option<CacheContext>,
}

impl DataGatherer {
    pub fn new(cache: Option<CacheContext>) -> Self {
        Self { cache }
    }

    /// Gather every source. Individual failures are recorded, not fatal;
    /// the completeness score and missing-critical list tell the caller
    /// how much survived.
    pub async fn gather(&self, client: &mut McpClient) -> Result<GatheredData> {
        let mut gathered = GatheredData::default();

        for spec in DATA_SOURCES {
            match self.gather_source(client, spec).await {
                Ok(value) => {
                    gathered.sources.insert(spec.name.to_string(), value);
                    gathered.completed.push(spec.name.to_string());
                }
                Err(e) => {
                    tracing::warn!("Failed to gather {}: {}", spec.name, e);
                    gathered.failed.push(spec.name.to_string());
                }
            }
        }

        // Aged reports need a contact id each, so they run after contacts
        if let Some(contacts) = gathered.sources.get("contacts").cloned() {
            let contact_ids = contact_ids(&contacts);
            for (name, tool) in [
                ("aged_receivables", "list-aged-receivables-by-contact"),
                ("aged_payables", "list-aged-payables-by-contact"),
            ] {
                match self.gather_aged_report(client, tool, &contact_ids).await {
                    Ok(value) => {
                        gathered.sources.insert(name.to_string(), value);
                        gathered.completed.push(name.to_string());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to gather {}: {}", name, e);
                        gathered.failed.push(name.to_string());
                    }
                }
            }
        }

        tracing::info!(
            "Gathered {}/{} sources ({}% complete)",
            gathered.completed.len(),
            gathered.completed.len() + gathered.failed.len(),
            gathered.completeness_score()
        );
        Ok(gathered)
    }

    async fn gather_source(&self, client: &mut McpClient, spec: &SourceSpec) -> Result<Value> {
        let cache_key = spec.name;
        if let Some(cache) = &self.cache {
            if let Some(value) = cache.get(cache_key).await {
                tracing::debug!("Cache hit for {}", cache_key);
                return Ok(value);
            }
        }

        let value = if spec.paginated {
            self.fetch_all_pages(client, spec.tool).await?
        } else {
            client.call_tool(spec.tool, json!({})).await?
        };

        if let Some(cache) = &self.cache {
            cache.put(cache_key, &value).await;
        }
        Ok(value)
    }

    /// Page through a listing tool until a short page arrives, merging the
    /// content arrays into one result.
    async fn fetch_all_pages(&self, client: &mut McpClient, tool: &str) -> Result<Value> {
        let mut all_content: Vec<Value> = Vec::new();

        for page in 1..=MAX_PAGES {
            let result = client.call_tool(tool, json!({"page": page})).await?;
            let records = record_texts(&result).len();

            if let Some(content) = result.get("content").and_then(Value::as_array) {
                all_content.extend(content.iter().cloned());
            }
            if records == 0 || records < PAGE_SIZE {
                break;
            }
        }
        Ok(json!({"content": all_content}))
    }

    async fn gather_aged_report(
        &self,
        client: &mut McpClient,
        tool: &str,
        contact_ids: &[String],
    ) -> Result<Value> {
        let mut all_content: Vec<Value> = Vec::new();
        for contact_id in contact_ids.iter().take(MAX_AGED_CONTACTS) {
            let result = client
                .call_tool(tool, json!({"contactId": contact_id}))
                .await?;
            if let Some(content) = result.get("content").and_then(Value::as_array) {
                all_content.extend(content.iter().cloned());
            }
        }
        Ok(json!({"content": all_content}))
    }
}

/// Pull contact ids out of the formatted contacts listing.
fn contact_ids(contacts: &Value) -> Vec<String> {
    let mut ids = Vec::new();
    for text in record_texts(contacts) {
        for line in text.lines() {
            if let Some(id) = line.trim().strip_prefix("Contact ID:") {
                let id = id.trim();
                if !id.is_empty() {
                    ids.push(id.to_string());
                }
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completeness_score_is_completed_over_total() {
        let gathered = GatheredData {
            sources: HashMap::new(),
            completed: vec!["a".into(), "b".into(), "c".into()],
            failed: vec!["d".into()],
        };
        assert_eq!(gathered.completeness_score(), 75);
    }

    #[test]
    fn empty_gather_scores_zero() {
        assert_eq!(GatheredData::default().completeness_score(), 0);
    }

    #[test]
    fn missing_critical_reports_absent_sources() {
        let mut gathered = GatheredData::default();
        gathered
            .sources
            .insert("accounts".into(), json!({"content": []}));
        assert_eq!(gathered.missing_critical(), vec!["organisation"]);

        gathered
            .sources
            .insert("organisation".into(), json!({"content": []}));
        assert!(gathered.missing_critical().is_empty());
    }

    #[test]
    fn contact_ids_are_extracted_from_text() {
        let contacts = json!({
            "content": [
                {"type": "text", "text": "Found 2 contacts:"},
                {"type": "text", "text": "Contact: Acme\nContact ID: c-1"},
                {"type": "text", "text": "Contact: Beta\nContact ID: c-2\nEmail: b@example.com"},
            ]
        });
        assert_eq!(contact_ids(&contacts), vec!["c-1", "c-2"]);
    }

    #[test]
    fn critical_sources_are_declared() {
        let names: Vec<&str> = DATA_SOURCES.iter().map(|s| s.name).collect();
        for critical in CRITICAL_SOURCES {
            assert!(names.contains(critical));
        }
    }
}
