//! LLM engines behind a common trait.
//!
//! Two backends: the OpenAI chat completions API and Toqan's conversation
//! API. Both are asked for JSON and both are read leniently, since models
//! occasionally wrap JSON in markdown fences or prose.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::error::{AppError, Result};

#[async_trait]
pub trait LlmEngine: Send + Sync {
    fn engine_name(&self) -> &'static str;

    /// Run one completion and return the model's raw text answer.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Run one completion and parse the answer as a JSON object.
    async fn complete_json(&self, system_prompt: &str, user_prompt: &str) -> Result<serde_json::Value> {
        let text = self.complete(system_prompt, user_prompt).await?;
        extract_json_object(&text).ok_or_else(|| {
            AppError::Upstream(format!(
                "{} returned a response with no JSON object",
                self.engine_name()
            ))
        })
    }
}

/// Pull the first JSON object out of a model response, tolerating markdown
/// fences and surrounding prose.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    // Fast path: the whole response is the object
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    // Strip a ```json ... ``` fence if present
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(after[..end].trim()) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
    }

    // Last resort: widest brace span
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<serde_json::Value>(&trimmed[start..=end])
        .ok()
        .filter(|v| v.is_object())
}

// ===== OpenAI =====

pub struct OpenAiEngine {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiEngine {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            base_url: "https://api.openai.com".into(),
        }
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base_url = base.trim_end_matches('/').into();
        self
    }
}

#[async_trait]
impl LlmEngine for OpenAiEngine {
    fn engine_name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.3,
            "max_tokens": 4000,
        });

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!("OpenAI returned {}: {}", status, detail);
            return Err(AppError::Upstream(format!(
                "OpenAI request failed with status {status}"
            )));
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }
        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }
        #[derive(Deserialize)]
        struct Completion {
            choices: Vec<Choice>,
        }

        let completion = response.json::<Completion>().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::Upstream("OpenAI returned no choices".into()))
    }
}

// ===== Toqan =====

pub struct ToqanEngine {
    http: Client,
    api_key: String,
    base_url: String,
}

impl ToqanEngine {
    /// How many times to poll for an answer, one second apart.
    const MAX_POLLS: u32 = 60;

    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            api_key: config.toqan_api_key.clone(),
            base_url: config.toqan_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LlmEngine for ToqanEngine {
    fn engine_name(&self) -> &'static str {
        "toqan"
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        // Toqan has no system role; the system prompt is prepended.
        let message = format!("{system_prompt}\n\n{user_prompt}");

        #[derive(Deserialize)]
        struct Created {
            conversation_id: String,
        }

        let response = self
            .http
            .post(format!("{}/create_conversation", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .json(&json!({"user_message": message}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "Toqan create_conversation failed with status {status}"
            )));
        }
        let created = response.json::<Created>().await?;

        #[derive(Deserialize)]
        struct Found {
            #[serde(default)]
            status: Option<String>,
            #[serde(default)]
            answer: Option<String>,
        }

        for _ in 0..Self::MAX_POLLS {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;

            let response = self
                .http
                .get(format!("{}/find_conversation", self.base_url))
                .header("X-Api-Key", &self.api_key)
                .query(&[("conversation_id", created.conversation_id.as_str())])
                .send()
                .await?;

            if !response.status().is_success() {
                continue;
            }
            let found = response.json::<Found>().await?;
            match found.status.as_deref() {
                Some("finished") | Some("completed") => {
                    if let Some(answer) = found.answer {
                        return Ok(answer);
                    }
                }
                Some("failed") => {
                    return Err(AppError::Upstream("Toqan conversation failed".into()));
                }
                _ => {}
            }
        }

        Err(AppError::Upstream(
            "Toqan conversation did not finish in time".into(),
        ))
    }
}

/// Pick the configured engine.
pub fn engine_from_config(http: Client, config: &Config) -> Box<dyn LlmEngine> {
    match config.llm_provider.as_str() {
        "toqan" => Box::new(ToqanEngine::new(http, config)),
        _ => Box::new(OpenAiEngine::new(http, config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_bare_object() {
        let value = extract_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn extracts_fenced_object() {
        let text = "Here you go:\n```json\n{\"risk\": \"green\"}\n```\nHope that helps!";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value, json!({"risk": "green"}));
    }

    #[test]
    fn extracts_object_embedded_in_prose() {
        let text = "The answer is {\"n\": 2} as requested.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value, json!({"n": 2}));
    }

    #[test]
    fn rejects_text_without_object() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("} backwards {").is_none());
    }

    #[test]
    fn engine_selection_follows_config() {
        let mut config = Config::default_for_tests();
        config.llm_provider = "toqan".into();
        config.toqan_base_url = "https://toqan.example".into();
        let engine = engine_from_config(Client::new(), &config);
        assert_eq!(engine.engine_name(), "toqan");

        config.llm_provider = "openai".into();
        let engine = engine_from_config(Client::new(), &config);
        assert_eq!(engine.engine_name(), "openai");
    }
}
