use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use finhealth_backend::api::{build_router, AppState};
use finhealth_backend::config::Config;
use finhealth_backend::services::scheduler_service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    scheduler_service::spawn_all(db.clone());

    if config.demo_mode {
        tracing::info!("demo mode enabled, write endpoints are disabled");
    }

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(db, config)?);
    spawn_event_logger(&state);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Mirror every domain event into the debug log.
fn spawn_event_logger(state: &Arc<AppState>) {
    let mut events = state.event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!(
                    event = %event.event_type,
                    entity = %event.entity_id,
                    actor = event.actor.as_deref().unwrap_or("-"),
                    "domain event"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("event logger fell behind, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
