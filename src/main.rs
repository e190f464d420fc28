use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wineup_api::{
    api::{create_router, AppState},
    config::Config,
    db::{self, PgRecordStore, RecordStore},
    services::{strategy, MatrixService},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = db::create_pool(&config.database_url, config.database_max_connections)
        .context("Invalid DATABASE_URL")?;

    let records: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(pool));
    let matrix = Arc::new(MatrixService::new(strategy::from_config(&config)));

    // The server still starts when the database is unreachable; /health
    // reports 503 and POST /admin/bootstrap retries migrations and loading.
    if let Err(e) = matrix.bootstrap(records.as_ref()).await {
        tracing::error!(error = %e, "Rating matrix unavailable until bootstrap succeeds");
    }

    let state = AppState::new(matrix, records, config.default_page_size);
    let app = create_router(state).layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
