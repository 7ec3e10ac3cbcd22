//! Route configuration and setup.

use crate::handlers::{admin, download};
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use datashare_core::Config;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(config)?;

    let router = Router::new()
        .route("/datasets/{id}/download", get(download::issue_download))
        .route("/datasets/download/{token}", get(download::stream_download))
        .route(
            "/datasets/download/{token}/progress",
            get(download::download_progress),
        )
        .route(
            "/datasets/download/{token}/retry",
            post(download::retry_download),
        )
        .route("/admin/storage/status", get(admin::storage_status))
        .route("/admin/storage/migrate", post(admin::migrate_storage))
        .route("/admin/storage/verify", post(admin::verify_storage))
        .route("/admin/storage/reload", post(admin::reload_storage))
        .route("/health", get(health_check))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(crate::api_doc::openapi()) }),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    Ok(router)
}

/// Liveness probe - process is running.
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "alive" }))
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let cors = if config.cors_origins().contains(&"*".to_string()) {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins()
            .iter()
            .map(|o| {
                o.parse()
                    .map_err(|_| anyhow::anyhow!("Invalid CORS origin: {}", o))
            })
            .collect::<Result<_, _>>()?;
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    };
    Ok(cors)
}
