//! Collaborator seams: permission checks and the dataset catalog.
//!
//! Authentication, permission modeling, and dataset metadata live outside
//! this subsystem. They are consumed through these two traits; the rest of
//! the crate never sees more than `can_access` and the dataset record
//! slice. `InMemoryCatalog` backs tests and single-node deployments.

use async_trait::async_trait;
use datashare_core::models::dataset::{DatasetOperation, DatasetRecord};
use datashare_core::models::storage::StorageLocation;
use datashare_core::AppError;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::AppResult;

/// External capability check: `can_access(user, dataset, operation)`.
#[async_trait]
pub trait AccessChecker: Send + Sync {
    async fn can_access(
        &self,
        user_id: Uuid,
        dataset_id: Uuid,
        operation: DatasetOperation,
    ) -> bool;
}

/// External dataset-record lookup plus the storage-location registry this
/// subsystem owns the mutations of.
#[async_trait]
pub trait DatasetCatalog: Send + Sync {
    async fn get_dataset(&self, id: Uuid) -> AppResult<Option<DatasetRecord>>;

    async fn list_datasets(&self) -> AppResult<Vec<DatasetRecord>>;

    /// Replace the recorded physical locations for a dataset. Called only
    /// by writes and migrations, after verification.
    async fn set_locations(&self, id: Uuid, locations: Vec<StorageLocation>) -> AppResult<()>;
}

/// Permissive checker for tests and single-tenant deployments.
pub struct AllowAllAccess;

#[async_trait]
impl AccessChecker for AllowAllAccess {
    async fn can_access(&self, _user: Uuid, _dataset: Uuid, _operation: DatasetOperation) -> bool {
        true
    }
}

/// In-memory catalog implementation.
#[derive(Default)]
pub struct InMemoryCatalog {
    datasets: RwLock<HashMap<Uuid, DatasetRecord>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: DatasetRecord) {
        let mut datasets = self.datasets.write().unwrap_or_else(|e| e.into_inner());
        datasets.insert(record.id, record);
    }
}

#[async_trait]
impl DatasetCatalog for InMemoryCatalog {
    async fn get_dataset(&self, id: Uuid) -> AppResult<Option<DatasetRecord>> {
        let datasets = self.datasets.read().unwrap_or_else(|e| e.into_inner());
        Ok(datasets.get(&id).cloned())
    }

    async fn list_datasets(&self) -> AppResult<Vec<DatasetRecord>> {
        let datasets = self.datasets.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = datasets.values().cloned().collect();
        all.sort_by_key(|d| d.id);
        Ok(all)
    }

    async fn set_locations(&self, id: Uuid, locations: Vec<StorageLocation>) -> AppResult<()> {
        let mut datasets = self.datasets.write().unwrap_or_else(|e| e.into_inner());
        let record = datasets
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Dataset {} not found", id)))?;
        record.locations = locations;
        Ok(())
    }
}
