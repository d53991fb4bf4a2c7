//! JWT bearer authentication middleware.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub email: String,
    /// Organization the token is scoped to, when the user belongs to one
    pub org: Option<Uuid>,
    pub exp: i64,
    pub iat: i64,
}

/// Request-scoped identity, inserted by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthExtension {
    pub user_id: Uuid,
    pub email: String,
    pub organization_id: Option<Uuid>,
}

impl AuthExtension {
    /// Organization scope, or 401 for tokens issued without one.
    pub fn org(&self) -> Result<Uuid> {
        self.organization_id.ok_or_else(|| {
            AppError::Unauthorized("Token is not scoped to an organization".into())
        })
    }
}

pub fn issue_token(
    secret: &str,
    expiration_hours: i64,
    user_id: Uuid,
    email: &str,
    organization_id: Option<Uuid>,
) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        org: organization_id,
        exp: (now + Duration::hours(expiration_hours)).timestamp(),
        iat: now.timestamp(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Authentication("Invalid or expired token".into()))?;
    Ok(data.claims)
}

/// Reject requests without a valid bearer token, attaching `AuthExtension`
/// for handlers on success.
pub async fn require_auth(
    State(state): State<SharedState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Authentication("Missing bearer token".into()))?;

    let claims = verify_token(&state.config.jwt_secret, token)?;
    request.extensions_mut().insert(AuthExtension {
        user_id: claims.sub,
        email: claims.email,
        organization_id: claims.org,
    });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let user_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let token =
            issue_token("test-secret", 24, user_id, "a@example.com", Some(org_id)).unwrap();
        let claims = verify_token("test-secret", &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.org, Some(org_id));
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token("secret-a", 24, Uuid::new_v4(), "a@example.com", None).unwrap();
        assert!(verify_token("secret-b", &token).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(verify_token("secret", "not.a.jwt").is_err());
    }

    #[test]
    fn org_scope_is_required_for_org_operations() {
        let auth = AuthExtension {
            user_id: Uuid::new_v4(),
            email: "a@example.com".into(),
            organization_id: None,
        };
        assert!(auth.org().is_err());

        let org_id = Uuid::new_v4();
        let auth = AuthExtension {
            organization_id: Some(org_id),
            ..auth
        };
        assert_eq!(auth.org().unwrap(), org_id);
    }
}
