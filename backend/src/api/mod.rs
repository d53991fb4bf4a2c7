//! HTTP surface: shared state, router assembly, middleware wiring.

pub mod handlers;
pub mod middleware;
pub mod openapi;

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use sqlx::PgPool;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::config::Config;
use crate::error::Result;
use crate::services::cache_service::{CacheService, MemoryCache};
use crate::services::event_bus::EventBus;
use crate::services::token_cipher::TokenCipher;

pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub http: reqwest::Client,
    pub event_bus: Arc<EventBus>,
    pub cache: Arc<CacheService>,
    pub token_cipher: TokenCipher,
    /// Pending OAuth CSRF states, consumed on callback.
    pub oauth_states: MemoryCache,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Result<Self> {
        let token_cipher = TokenCipher::from_hex_key(&config.token_encryption_key)?;
        Ok(Self {
            db,
            config,
            http: reqwest::Client::new(),
            event_bus: Arc::new(EventBus::new(256)),
            cache: Arc::new(CacheService::new()),
            token_cipher,
            oauth_states: MemoryCache::new(128, std::time::Duration::from_secs(600)),
        })
    }
}

/// Assemble the full application router.
pub fn build_router(state: SharedState) -> Router {
    let protected = Router::new()
        .nest("/auth", handlers::auth::protected_router())
        .nest("/organizations", handlers::organizations::router())
        .nest("/users", handlers::users::router())
        .nest("/permissions", handlers::rbac::permissions_router())
        .nest("/roles", handlers::rbac::roles_router())
        .nest("/connections", handlers::connections::router())
        .nest("/connect", handlers::oauth::router())
        .nest("/payroll-risk", handlers::payroll_risk::router())
        .nest("/cache", handlers::cache::router())
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let public = Router::new()
        .nest("/auth", handlers::auth::router())
        .nest("/connect", handlers::oauth::callback_router())
        .route(
            "/openapi.json",
            get(|| async { Json(openapi::ApiDoc::openapi()) }),
        );

    Router::new()
        .nest("/api/v1", public.merge(protected))
        .merge(handlers::health::router())
        .layer(from_fn_with_state(
            state.clone(),
            middleware::demo::demo_guard,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
