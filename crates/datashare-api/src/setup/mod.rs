//! Application setup and initialization
//!
//! This module contains all application initialization logic extracted from main.rs
//! for better organization and testability.

pub mod routes;
pub mod server;
pub mod telemetry;

pub use telemetry::init_tracing;

use crate::state::AppState;
use anyhow::{Context, Result};
use datashare_core::Config;
use datashare_services::{
    AccessChecker, DatasetCatalog, DownloadOrchestrator, InMemoryCatalog, IntegrityVerifier,
    MigrationEngine, ProgressTracker, TokenManager,
};
use datashare_storage::StorageRouter;
use std::sync::Arc;

/// Interval between progress-session sweeper passes.
const SWEEP_INTERVAL_SECS: u64 = 30;

/// Wire the domain services onto a prepared storage router.
///
/// The catalog and access checker are collaborator seams; the binary wires
/// the in-memory implementations, tests and embedding services bring their
/// own.
pub fn build_state(
    config: Config,
    storage: Arc<StorageRouter>,
    catalog: Arc<dyn DatasetCatalog>,
    access: Arc<dyn AccessChecker>,
) -> Arc<AppState> {
    let tokens = Arc::new(TokenManager::new(
        catalog.clone(),
        access,
        config.token_ttl_secs,
    ));
    let tracker = Arc::new(ProgressTracker::new(
        config.session_idle_timeout_secs,
        config.session_retention_secs,
    ));
    let orchestrator = DownloadOrchestrator::new(
        tokens.clone(),
        tracker.clone(),
        catalog.clone(),
        config.transform_ceiling_bytes,
    );
    let migration = MigrationEngine::new(catalog.clone());
    let verifier = IntegrityVerifier::new(catalog.clone());

    Arc::new(AppState::new(
        config,
        storage,
        catalog,
        tokens,
        tracker,
        orchestrator,
        migration,
        verifier,
    ))
}

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Fail fast on misconfiguration before any backend is touched.
    config
        .validate()
        .context("Configuration validation failed")?;

    let storage = datashare_storage::create_router(&config)
        .await
        .context("Storage initialization failed")?;

    let catalog = Arc::new(InMemoryCatalog::new());
    let access = Arc::new(datashare_services::AllowAllAccess);
    let state = build_state(config, storage, catalog, access);

    state.tracker.spawn_sweeper(SWEEP_INTERVAL_SECS);
    state.tokens.spawn_gc(SWEEP_INTERVAL_SECS);

    let router = routes::setup_routes(&state.config, state.clone())?;
    Ok((state, router))
}
