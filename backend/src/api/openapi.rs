//! OpenAPI specification via utoipa.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Top-level OpenAPI document for the FinHealth API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "FinHealth API",
        description = "Connects organizations to Xero and QuickBooks and runs \
                       agentic payroll risk analysis over their accounting data.",
        version = "0.4.1",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication and token management"),
        (name = "organizations", description = "Organization CRUD and membership"),
        (name = "users", description = "User management"),
        (name = "permissions", description = "RBAC permission management"),
        (name = "roles", description = "Org-scoped roles and assignments"),
        (name = "connections", description = "Provider connections and tenants"),
        (name = "connect", description = "OAuth connect flow"),
        (name = "payroll-risk", description = "Payroll risk analyses"),
        (name = "cache", description = "Provider data cache"),
        (name = "health", description = "Health and readiness checks"),
    ),
    components(schemas(
        ErrorResponse,
        crate::models::organization::Organization,
        crate::models::user::UserResponse,
        crate::models::rbac::Permission,
        crate::models::rbac::OrgRole,
        crate::models::connection::ConnectionResponse,
        crate::models::connection::ProviderTenant,
        crate::models::payroll_risk::PayrollRiskAnalysis,
        crate::models::payroll_risk::AnalysisStatus,
        crate::agents::result::PayrollRiskResult,
    ))
)]
pub struct ApiDoc;

/// Standard error response body returned by all endpoints on failure.
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "NOT_FOUND", "VALIDATION_ERROR")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// Adds Bearer JWT security scheme to the OpenAPI spec.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_builds_with_security_scheme() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().expect("openapi serializes");
        assert!(json.contains("bearer_auth"));
        assert!(json.contains("FinHealth API"));
    }
}
