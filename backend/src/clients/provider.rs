//! Common OAuth surface shared by the accounting providers.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::error::Result;

/// Token endpoint response, identical shape for Xero and QuickBooks.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Build the HTTP Basic credential both providers require on their token
/// endpoints: base64("client_id:client_secret").
pub fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    format!(
        "Basic {}",
        BASE64.encode(format!("{client_id}:{client_secret}"))
    )
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// "xero" or "quickbooks"
    fn provider_name(&self) -> &'static str;

    /// The URL the user's browser is sent to for consent. `state` is the
    /// opaque CSRF token echoed back on the callback.
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_encodes_id_and_secret() {
        let header = basic_auth_header("my-id", "my-secret");
        assert!(header.starts_with("Basic "));
        let decoded = BASE64.decode(header.trim_start_matches("Basic ")).unwrap();
        assert_eq!(decoded, b"my-id:my-secret");
    }

    #[test]
    fn token_response_tolerates_missing_optionals() {
        let json = r#"{"access_token": "abc", "expires_in": 1800}"#;
        let parsed: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.access_token, "abc");
        assert_eq!(parsed.refresh_token, None);
        assert_eq!(parsed.expires_in, 1800);
    }
}
