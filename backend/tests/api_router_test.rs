//! Router-level tests: middleware ordering, auth rejection, and the demo
//! guard. The pool is lazy, so nothing here touches a database.
//!
//! Run with:
//!   cargo test --test api_router_test

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use sqlx::postgres::PgPoolOptions;

use finhealth_backend::api::{build_router, AppState};
use finhealth_backend::config::Config;

fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/finhealth".into(),
        bind_addr: "0.0.0.0:8000".into(),
        jwt_secret: "secret".into(),
        jwt_expiration_hours: 24,
        token_encryption_key: "ab".repeat(32),
        xero_client_id: "xero-id".into(),
        xero_client_secret: "xero-secret".into(),
        xero_redirect_uri: "http://localhost:8000/api/v1/connect/xero/callback".into(),
        quickbooks_client_id: "qb-id".into(),
        quickbooks_client_secret: "qb-secret".into(),
        quickbooks_redirect_uri: "http://localhost:8000/api/v1/connect/quickbooks/callback".into(),
        mcp_server_path: "dist/index.js".into(),
        llm_provider: "openai".into(),
        openai_api_key: String::new(),
        openai_model: "gpt-4o".into(),
        toqan_api_key: String::new(),
        toqan_base_url: String::new(),
        demo_mode: false,
    }
}

fn test_server(config: Config) -> TestServer {
    let db = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    let state = Arc::new(AppState::new(db, config).unwrap());
    TestServer::new(build_router(state)).unwrap()
}

#[tokio::test]
async fn health_answers_without_a_database() {
    let server = test_server(test_config());
    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn openapi_document_is_public() {
    let server = test_server(test_config());
    let response = server.get("/api/v1/openapi.json").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert!(body["components"]["schemas"].is_object());
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let server = test_server(test_config());
    for route in [
        "/api/v1/organizations",
        "/api/v1/connections",
        "/api/v1/payroll-risk/analyses",
        "/api/v1/roles/check?resource=connections&action=read",
        "/api/v1/cache/stats",
    ] {
        let response = server.get(route).await;
        assert_eq!(
            response.status_code(),
            StatusCode::UNAUTHORIZED,
            "expected 401 from {route}"
        );
    }
}

#[tokio::test]
async fn garbage_bearer_tokens_are_rejected() {
    let server = test_server(test_config());
    let response = server
        .get("/api/v1/organizations")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer not-a-jwt"),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn oauth_callback_rejects_unknown_state() {
    let server = test_server(test_config());
    let response = server
        .get("/api/v1/connect/xero/callback?code=abc&state=never-issued")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "OAUTH_ERROR");
}

#[tokio::test]
async fn demo_mode_blocks_writes_but_not_reads() {
    let mut config = test_config();
    config.demo_mode = true;
    let server = test_server(config);

    let write = server.post("/api/v1/organizations").await;
    assert_eq!(write.status_code(), StatusCode::FORBIDDEN);

    let read = server.get("/health").await;
    assert_eq!(read.status_code(), StatusCode::OK);
}
