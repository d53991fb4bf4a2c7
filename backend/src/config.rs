//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};

/// Runtime configuration.
///
/// Every value comes from the environment (a `.env` file is loaded by the
/// binary before this is built). Secrets are held as plain strings here and
/// never serialized.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string
    pub database_url: String,
    /// Bind address, e.g. "0.0.0.0:8000"
    pub bind_addr: String,

    /// HS256 secret for API JWTs
    pub jwt_secret: String,
    /// JWT lifetime in hours
    pub jwt_expiration_hours: i64,

    /// Hex-encoded 32-byte key for encrypting OAuth tokens at rest
    pub token_encryption_key: String,

    // Xero OAuth 2.0
    pub xero_client_id: String,
    pub xero_client_secret: String,
    pub xero_redirect_uri: String,

    // QuickBooks OAuth 2.0
    pub quickbooks_client_id: String,
    pub quickbooks_client_secret: String,
    pub quickbooks_redirect_uri: String,

    /// Path to the MCP server entry point (node script)
    pub mcp_server_path: String,

    /// LLM provider: "openai" or "toqan"
    pub llm_provider: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub toqan_api_key: String,
    pub toqan_base_url: String,

    /// Block write operations when true (public demo deployments)
    pub demo_mode: bool,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL is required".into()))?;

        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET is required".into()))?;

        let token_encryption_key = std::env::var("TOKEN_ENCRYPTION_KEY")
            .map_err(|_| AppError::Config("TOKEN_ENCRYPTION_KEY is required".into()))?;

        let config = Self {
            database_url,
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8000"),
            jwt_secret,
            jwt_expiration_hours: env_or("JWT_EXPIRATION_HOURS", "24")
                .parse()
                .map_err(|_| AppError::Config("JWT_EXPIRATION_HOURS must be an integer".into()))?,
            token_encryption_key,
            xero_client_id: env_or("XERO_CLIENT_ID", ""),
            xero_client_secret: env_or("XERO_CLIENT_SECRET", ""),
            xero_redirect_uri: env_or(
                "XERO_REDIRECT_URI",
                "http://localhost:8000/api/v1/connect/xero/callback",
            ),
            quickbooks_client_id: env_or("QUICKBOOKS_CLIENT_ID", ""),
            quickbooks_client_secret: env_or("QUICKBOOKS_CLIENT_SECRET", ""),
            quickbooks_redirect_uri: env_or(
                "QUICKBOOKS_REDIRECT_URI",
                "http://localhost:8000/api/v1/connect/quickbooks/callback",
            ),
            mcp_server_path: env_or("MCP_SERVER_PATH", "xero-mcp-server/dist/index.js"),
            llm_provider: Self::detect_llm_provider(),
            openai_api_key: env_or("OPENAI_API_KEY", ""),
            openai_model: env_or("OPENAI_MODEL", "gpt-4o"),
            toqan_api_key: env_or("TOQAN_API_KEY", ""),
            toqan_base_url: env_or("TOQAN_API_BASE_URL", "https://api.coco.prod.toqan.ai/api"),
            demo_mode: env_or("DEMO_MODE", "false").eq_ignore_ascii_case("true"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Auto-detect the LLM provider when LLM_PROVIDER is unset, preferring
    /// Toqan if its API key is present.
    fn detect_llm_provider() -> String {
        match std::env::var("LLM_PROVIDER") {
            Ok(p) if !p.is_empty() => p.to_lowercase(),
            _ => {
                if std::env::var("TOQAN_API_KEY").is_ok_and(|k| !k.is_empty()) {
                    "toqan".to_string()
                } else {
                    "openai".to_string()
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.token_encryption_key.len() != 64
            || hex::decode(&self.token_encryption_key).is_err()
        {
            return Err(AppError::Config(
                "TOKEN_ENCRYPTION_KEY must be 64 hex characters (32 bytes)".into(),
            ));
        }
        if self.llm_provider != "openai" && self.llm_provider != "toqan" {
            return Err(AppError::Config(format!(
                "Unsupported LLM_PROVIDER '{}'",
                self.llm_provider
            )));
        }
        Ok(())
    }

    /// OAuth scopes requested from Xero.
    pub fn xero_scopes(&self) -> &'static str {
        "accounting.transactions accounting.settings.read accounting.reports.read \
         accounting.contacts accounting.attachments accounting.journals.read offline_access"
    }

    /// OAuth scopes requested from QuickBooks.
    pub fn quickbooks_scopes(&self) -> &'static str {
        "com.intuit.quickbooks.accounting"
    }

    /// A structurally valid config for unit tests.
    #[cfg(test)]
    pub(crate) fn default_for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/finhealth".into(),
            bind_addr: "0.0.0.0:8000".into(),
            jwt_secret: "secret".into(),
            jwt_expiration_hours: 24,
            token_encryption_key: "ab".repeat(32),
            xero_client_id: "id".into(),
            xero_client_secret: "secret".into(),
            xero_redirect_uri: "http://localhost:8000/cb".into(),
            quickbooks_client_id: String::new(),
            quickbooks_client_secret: String::new(),
            quickbooks_redirect_uri: String::new(),
            mcp_server_path: "dist/index.js".into(),
            llm_provider: "openai".into(),
            openai_api_key: String::new(),
            openai_model: "gpt-4o".into(),
            toqan_api_key: String::new(),
            toqan_base_url: String::new(),
            demo_mode: false,
        }
    }
}
