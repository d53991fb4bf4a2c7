//! Xero OAuth 2.0 and accounting API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{AppError, Result};

use super::provider::{basic_auth_header, ProviderClient, TokenResponse};

const LOGIN_BASE: &str = "https://login.xero.com";
const IDENTITY_BASE: &str = "https://identity.xero.com";
const API_BASE: &str = "https://api.xero.com";

/// One entry from Xero's `GET /connections`: a tenant the token can reach.
#[derive(Debug, Clone, Deserialize)]
pub struct XeroConnection {
    /// Xero's id for the connection itself, needed for disconnects.
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "tenantName")]
    pub tenant_name: Option<String>,
    #[serde(rename = "tenantType")]
    pub tenant_type: Option<String>,
}

#[derive(Clone)]
pub struct XeroClient {
    http: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: String,
    login_base: String,
    identity_base: String,
    api_base: String,
}

impl XeroClient {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            client_id: config.xero_client_id.clone(),
            client_secret: config.xero_client_secret.clone(),
            redirect_uri: config.xero_redirect_uri.clone(),
            scopes: config.xero_scopes().to_string(),
            login_base: LOGIN_BASE.into(),
            identity_base: IDENTITY_BASE.into(),
            api_base: API_BASE.into(),
        }
    }

    /// Point all endpoints at one base URL. Test hook for wiremock.
    pub fn with_base_url(mut self, base: &str) -> Self {
        self.login_base = base.trim_end_matches('/').into();
        self.identity_base = self.login_base.clone();
        self.api_base = self.login_base.clone();
        self
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(format!("{}/connect/token", self.identity_base))
            .header(
                "Authorization",
                basic_auth_header(&self.client_id, &self.client_secret),
            )
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Xero token endpoint returned {}: {}", status, body);
            return Err(AppError::OAuth(format!(
                "Xero token request failed with status {status}"
            )));
        }
        Ok(response.json::<TokenResponse>().await?)
    }

    /// Tenants the access token is authorized for.
    pub async fn connections(&self, access_token: &str) -> Result<Vec<XeroConnection>> {
        let response = self
            .http
            .get(format!("{}/connections", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "Xero connections request failed with status {status}"
            )));
        }
        Ok(response.json::<Vec<XeroConnection>>().await?)
    }

    /// Revoke one tenant authorization on the Xero side.
    pub async fn disconnect(&self, access_token: &str, external_connection_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!(
                "{}/connections/{}",
                self.api_base, external_connection_id
            ))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        // Already gone on the Xero side counts as success
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::Upstream(format!(
                "Xero disconnect failed with status {status}"
            )));
        }
        Ok(())
    }

    /// Direct accounting API fetch, bypassing MCP. Used for the endpoints
    /// the MCP server does not expose.
    pub async fn get_manual_journal(
        &self,
        access_token: &str,
        tenant_id: &str,
        journal_id: &str,
    ) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(format!(
                "{}/api.xro/2.0/ManualJournals/{}",
                self.api_base, journal_id
            ))
            .bearer_auth(access_token)
            .header("Xero-tenant-id", tenant_id)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!(
                "Manual journal {journal_id} not found"
            )));
        }
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "Xero manual journal request failed with status {status}"
            )));
        }
        Ok(response.json::<serde_json::Value>().await?)
    }
}

#[async_trait]
impl ProviderClient for XeroClient {
    fn provider_name(&self) -> &'static str {
        "xero"
    }

    fn authorization_url(&self, state: &str) -> String {
        let query = serde_urlencoded::to_string([
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", self.scopes.as_str()),
            ("state", state),
        ])
        .unwrap_or_default();
        format!("{}/identity/connect/authorize?{query}", self.login_base)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> XeroClient {
        let mut config = Config::default_for_tests();
        config.xero_client_id = "xero-id".into();
        config.xero_client_secret = "xero-secret".into();
        config.xero_redirect_uri = "https://app.example.com/callback/xero".into();
        XeroClient::new(Client::new(), &config)
    }

    #[test]
    fn authorization_url_carries_state_and_scopes() {
        let url = test_client().authorization_url("state-123");
        assert!(url.starts_with("https://login.xero.com/identity/connect/authorize?"));
        assert!(url.contains("state=state-123"));
        assert!(url.contains("client_id=xero-id"));
        assert!(url.contains("offline_access"));
        assert!(url.contains("response_type=code"));
    }

    #[test]
    fn authorization_url_percent_encodes_redirect() {
        let url = test_client().authorization_url("s");
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fcallback%2Fxero"));
    }

    #[test]
    fn connection_listing_deserializes() {
        let json = r#"[{"id": "c-1", "tenantId": "t-1", "tenantName": "Demo Co", "tenantType": "ORGANISATION"}]"#;
        let parsed: Vec<XeroConnection> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed[0].tenant_id, "t-1");
        assert_eq!(parsed[0].tenant_name.as_deref(), Some("Demo Co"));
    }
}
