//! QuickBooks Online OAuth 2.0 client.
//!
//! Unlike Xero, QuickBooks delivers the tenant (realm) id as a `realmId`
//! query parameter on the OAuth callback rather than through a separate
//! connections endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{AppError, Result};

use super::provider::{basic_auth_header, ProviderClient, TokenResponse};

const AUTHORIZE_BASE: &str = "https://appcenter.intuit.com";
const TOKEN_BASE: &str = "https://oauth.platform.intuit.com";
const API_BASE: &str = "https://quickbooks.api.intuit.com";

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyInfo {
    #[serde(rename = "CompanyName")]
    pub company_name: Option<String>,
    #[serde(rename = "LegalName")]
    pub legal_name: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
}

#[derive(Clone)]
pub struct QuickBooksClient {
    http: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: String,
    authorize_base: String,
    token_base: String,
    api_base: String,
}

impl QuickBooksClient {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            client_id: config.quickbooks_client_id.clone(),
            client_secret: config.quickbooks_client_secret.clone(),
            redirect_uri: config.quickbooks_redirect_uri.clone(),
            scopes: config.quickbooks_scopes().to_string(),
            authorize_base: AUTHORIZE_BASE.into(),
            token_base: TOKEN_BASE.into(),
            api_base: API_BASE.into(),
        }
    }

    /// Point all endpoints at one base URL. Test hook for wiremock.
    pub fn with_base_url(mut self, base: &str) -> Self {
        self.authorize_base = base.trim_end_matches('/').into();
        self.token_base = self.authorize_base.clone();
        self.api_base = self.authorize_base.clone();
        self
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(format!("{}/oauth2/v1/tokens/bearer", self.token_base))
            .header(
                "Authorization",
                basic_auth_header(&self.client_id, &self.client_secret),
            )
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("QuickBooks token endpoint returned {}: {}", status, body);
            return Err(AppError::OAuth(format!(
                "QuickBooks token request failed with status {status}"
            )));
        }
        Ok(response.json::<TokenResponse>().await?)
    }

    /// Company details for the realm, used to name the stored tenant.
    pub async fn company_info(&self, access_token: &str, realm_id: &str) -> Result<CompanyInfo> {
        let response = self
            .http
            .get(format!(
                "{}/v3/company/{realm_id}/companyinfo/{realm_id}",
                self.api_base
            ))
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "QuickBooks company info request failed with status {status}"
            )));
        }

        #[derive(Deserialize)]
        struct Envelope {
            #[serde(rename = "CompanyInfo")]
            company_info: CompanyInfo,
        }
        let envelope = response.json::<Envelope>().await?;
        Ok(envelope.company_info)
    }
}

#[async_trait]
impl ProviderClient for QuickBooksClient {
    fn provider_name(&self) -> &'static str {
        "quickbooks"
    }

    fn authorization_url(&self, state: &str) -> String {
        let query = serde_urlencoded::to_string([
            ("client_id", self.client_id.as_str()),
            ("response_type", "code"),
            ("scope", self.scopes.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("state", state),
        ])
        .unwrap_or_default();
        format!("{}/connect/oauth2?{query}", self.authorize_base)
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
