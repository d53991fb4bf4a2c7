//! OpenAI engine behavior against a mocked chat completions endpoint.

use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use finhealth_backend::clients::llm::{LlmEngine, OpenAiEngine};
use finhealth_backend::config::Config;

fn engine_config() -> Config {
    Config {
        database_url: "postgres://localhost/finhealth".into(),
        bind_addr: "0.0.0.0:8000".into(),
        jwt_secret: "secret".into(),
        jwt_expiration_hours: 24,
        token_encryption_key: "ab".repeat(32),
        xero_client_id: String::new(),
        xero_client_secret: String::new(),
        xero_redirect_uri: String::new(),
        quickbooks_client_id: String::new(),
        quickbooks_client_secret: String::new(),
        quickbooks_redirect_uri: String::new(),
        mcp_server_path: "dist/index.js".into(),
        llm_provider: "openai".into(),
        openai_api_key: "sk-test".into(),
        openai_model: "gpt-4o".into(),
        toqan_api_key: String::new(),
        toqan_base_url: String::new(),
        demo_mode: false,
    }
}

fn completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [
            {"message": {"role": "assistant", "content": content}}
        ]
    })
}

#[tokio::test]
async fn complete_json_parses_model_answer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body(r#"{"can_proceed": true, "reasoning": "ok"}"#)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine =
        OpenAiEngine::new(reqwest::Client::new(), &engine_config()).with_base_url(&server.uri());
    let value = engine.complete_json("system", "user").await.unwrap();

    assert_eq!(value["can_proceed"], serde_json::json!(true));
    assert_eq!(value["reasoning"], serde_json::json!("ok"));
}

#[tokio::test]
async fn fenced_answers_still_parse() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "```json\n{\"health_status\": \"Yellow\"}\n```",
        )))
        .mount(&server)
        .await;

    let engine =
        OpenAiEngine::new(reqwest::Client::new(), &engine_config()).with_base_url(&server.uri());
    let value = engine.complete_json("system", "user").await.unwrap();

    assert_eq!(value["health_status"], serde_json::json!("Yellow"));
}

#[tokio::test]
async fn rate_limits_surface_as_upstream_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let engine =
        OpenAiEngine::new(reqwest::Client::new(), &engine_config()).with_base_url(&server.uri());
    let err = engine.complete("system", "user").await.unwrap_err();

    assert!(err.to_string().contains("429"));
}
