//! Application state.
//!
//! The storage router is held behind an async RwLock of an immutable value:
//! handlers clone the `Arc` once per request and work against that snapshot,
//! so an admin reload swaps the router atomically without torn reads and
//! without blocking in-flight transfers.

use datashare_core::Config;
use datashare_services::{
    DatasetCatalog, DownloadOrchestrator, IntegrityVerifier, MigrationEngine, ProgressTracker,
    TokenManager,
};
use datashare_storage::StorageRouter;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct AppState {
    pub config: Config,
    storage: RwLock<Arc<StorageRouter>>,
    pub catalog: Arc<dyn DatasetCatalog>,
    pub tokens: Arc<TokenManager>,
    pub tracker: Arc<ProgressTracker>,
    pub orchestrator: DownloadOrchestrator,
    pub migration: MigrationEngine,
    pub verifier: IntegrityVerifier,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        storage: Arc<StorageRouter>,
        catalog: Arc<dyn DatasetCatalog>,
        tokens: Arc<TokenManager>,
        tracker: Arc<ProgressTracker>,
        orchestrator: DownloadOrchestrator,
        migration: MigrationEngine,
        verifier: IntegrityVerifier,
    ) -> Self {
        AppState {
            config,
            storage: RwLock::new(storage),
            catalog,
            tokens,
            tracker,
            orchestrator,
            migration,
            verifier,
        }
    }

    /// Snapshot of the current router. Requests keep working against the
    /// snapshot they took even while a reload swaps in a new one.
    pub async fn storage(&self) -> Arc<StorageRouter> {
        self.storage.read().await.clone()
    }

    pub async fn swap_storage(&self, router: Arc<StorageRouter>) {
        *self.storage.write().await = router;
    }
}
