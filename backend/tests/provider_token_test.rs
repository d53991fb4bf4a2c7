//! OAuth token exchange and refresh against mocked provider endpoints.
//!
//! Run with:
//!   cargo test --test provider_token_test

use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use finhealth_backend::clients::provider::ProviderClient;
use finhealth_backend::clients::quickbooks::QuickBooksClient;
use finhealth_backend::clients::xero::XeroClient;
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

fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 1800,
        "token_type": "Bearer",
        "scope": "accounting.transactions offline_access"
    })
}

#[tokio::test]
async fn xero_code_exchange_posts_basic_auth_form() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(header_exists("authorization"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at-1", "rt-1")))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        XeroClient::new(reqwest::Client::new(), &test_config()).with_base_url(&server.uri());
    let tokens = client.exchange_code("auth-code-1").await.unwrap();

    assert_eq!(tokens.access_token, "at-1");
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
    assert_eq!(tokens.expires_in, 1800);
}

#[tokio::test]
async fn xero_refresh_rotates_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at-2", "rt-new")))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        XeroClient::new(reqwest::Client::new(), &test_config()).with_base_url(&server.uri());
    let tokens = client.refresh("rt-old").await.unwrap();

    assert_eq!(tokens.access_token, "at-2");
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt-new"));
}

#[tokio::test]
async fn xero_token_failure_surfaces_as_oauth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })),
        )
        .mount(&server)
        .await;

    let client =
        XeroClient::new(reqwest::Client::new(), &test_config()).with_base_url(&server.uri());
    let err = client.refresh("rt-expired").await.unwrap_err();

    assert!(err.to_string().contains("400"));
}

#[tokio::test]
async fn xero_connections_lists_reachable_tenants() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/connections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": "ext-conn-1",
                "tenantId": "tenant-1",
                "tenantName": "Demo Co",
                "tenantType": "ORGANISATION"
            }
        ])))
        .mount(&server)
        .await;

    let client =
        XeroClient::new(reqwest::Client::new(), &test_config()).with_base_url(&server.uri());
    let tenants = client.connections("at-1").await.unwrap();

    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0].id, "ext-conn-1");
    assert_eq!(tenants[0].tenant_id, "tenant-1");
}

#[tokio::test]
async fn xero_disconnect_tolerates_already_removed() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/connections/ext-conn-gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client =
        XeroClient::new(reqwest::Client::new(), &test_config()).with_base_url(&server.uri());
    assert!(client.disconnect("at-1", "ext-conn-gone").await.is_ok());
}

#[tokio::test]
async fn quickbooks_code_exchange_hits_bearer_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/v1/tokens/bearer"))
        .and(header_exists("authorization"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("qb-at", "qb-rt")))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        QuickBooksClient::new(reqwest::Client::new(), &test_config()).with_base_url(&server.uri());
    let tokens = client.exchange_code("qb-code").await.unwrap();

    assert_eq!(tokens.access_token, "qb-at");
    assert_eq!(tokens.refresh_token.as_deref(), Some("qb-rt"));
}

#[tokio::test]
async fn quickbooks_company_info_unwraps_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/company/realm-9/companyinfo/realm-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "CompanyInfo": {
                "CompanyName": "Acme Plumbing",
                "Country": "US"
            }
        })))
        .mount(&server)
        .await;

    let client =
        QuickBooksClient::new(reqwest::Client::new(), &test_config()).with_base_url(&server.uri());
    let info = client.company_info("qb-at", "realm-9").await.unwrap();

    assert_eq!(info.company_name.as_deref(), Some("Acme Plumbing"));
}
