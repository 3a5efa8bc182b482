mod config;
mod error;
mod hub;
mod hub_hf;
mod imports;
mod resolver;
mod routes_datasets;
mod routes_hub;
mod state;
mod store_exec;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::hub_hf::HfHubClient;
use crate::state::{AppState, SharedState};

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    let hub = HfHubClient::new(cfg.hub.clone()).context("Failed to build hub client")?;
    let app_state: SharedState = Arc::new(
        AppState::new(cfg.clone(), Arc::new(hub))
            .with_context(|| format!("Failed to open data dir {}", cfg.data_dir.display()))?,
    );

    let app = router(app_state);

    let addr = &cfg.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        addr = %addr,
        data_dir = %cfg.data_dir.display(),
        hub = %cfg.hub.hub_url,
        "ingestd listening"
    );
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/datasets", get(routes_datasets::get_datasets))
        .route("/datasets/upload", post(routes_datasets::post_upload))
        .route("/datasets/validate", post(routes_datasets::post_validate))
        .route("/datasets/:id", get(routes_datasets::get_dataset))
        .route("/hub/search", get(routes_hub::get_search))
        .route("/hub/info/*name", get(routes_hub::get_info))
        .route("/hub/suggest-mapping", post(routes_hub::post_suggest_mapping))
        .route("/hub/preview", post(routes_hub::post_preview))
        .route("/hub/import", post(routes_hub::post_import))
        .route("/hub/imports/:id", get(routes_hub::get_import))
        .route("/hub/imports/:id/cancel", post(routes_hub::post_cancel_import))
        .route("/hub/popular", get(routes_hub::get_popular))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
