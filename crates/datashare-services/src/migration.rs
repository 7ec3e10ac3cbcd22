//! Backend-to-backend dataset migration.
//!
//! Copy, verify, record, then (optionally) delete: the source object is
//! never removed until the copy's checksum matches and the catalog points
//! at the new location, so an interrupted migration can only leave an extra
//! copy behind, never zero copies. Datasets migrate with bounded
//! concurrency, each under a per-dataset advisory lock so two overlapping
//! runs cannot work the same dataset at once.

use datashare_core::models::dataset::DatasetRecord;
use datashare_core::models::storage::{BackendKind, StorageLocation};
use datashare_core::AppError;
use datashare_storage::StorageRouter;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::catalog::DatasetCatalog;
use crate::AppResult;

const MIGRATION_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, serde::Serialize)]
pub struct MigrationFailure {
    pub dataset_id: Uuid,
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MigrationReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: Vec<MigrationFailure>,
    /// Candidate files examined; each dataset carries one source file.
    pub total_files: usize,
    pub bytes_moved: u64,
}

pub struct MigrationEngine {
    catalog: Arc<dyn DatasetCatalog>,
    in_flight: Mutex<HashSet<Uuid>>,
}

impl MigrationEngine {
    pub fn new(catalog: Arc<dyn DatasetCatalog>) -> Self {
        MigrationEngine {
            catalog,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn try_lock(&self, dataset_id: Uuid) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(dataset_id)
    }

    fn unlock(&self, dataset_id: Uuid) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&dataset_id);
    }

    /// Migrate datasets from one backend to another.
    ///
    /// `dataset_ids` of `None` means every dataset with a copy on `from`.
    /// `delete_source` removes the source copy after verification;
    /// `confirm` must be true because this rewrites location records.
    pub async fn migrate(
        &self,
        router: &StorageRouter,
        from: BackendKind,
        to: BackendKind,
        dataset_ids: Option<Vec<Uuid>>,
        delete_source: bool,
        confirm: bool,
    ) -> AppResult<MigrationReport> {
        if !confirm {
            return Err(AppError::InvalidInput(
                "Migration requires explicit confirmation".to_string(),
            ));
        }
        if from == to {
            return Err(AppError::InvalidInput(
                "Source and target backend are the same".to_string(),
            ));
        }
        // Fail fast before touching anything if either backend is missing.
        router.backend(from)?;
        router.backend(to)?;

        let candidates = self.candidates(from, dataset_ids).await?;
        tracing::info!(
            from = %from,
            to = %to,
            count = candidates.len(),
            delete_source,
            "Migration started"
        );

        let mut report = MigrationReport {
            total_files: candidates.len(),
            ..Default::default()
        };
        let mut outcomes = futures::stream::iter(candidates.into_iter().map(|dataset| {
            let id = dataset.id;
            async move {
                (
                    id,
                    self.migrate_one(router, dataset, from, to, delete_source)
                        .await,
                )
            }
        }))
        .buffer_unordered(MIGRATION_CONCURRENCY);

        while let Some((dataset_id, outcome)) = outcomes.next().await {
            report.processed += 1;
            match outcome {
                Ok(bytes) => {
                    report.succeeded += 1;
                    report.bytes_moved += bytes;
                }
                Err((key, err)) => {
                    tracing::warn!(dataset_id = %dataset_id, key = %key, error = %err, "Dataset migration failed");
                    report.failed.push(MigrationFailure {
                        dataset_id,
                        key,
                        reason: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            bytes_moved = report.bytes_moved,
            "Migration finished"
        );
        Ok(report)
    }

    async fn candidates(
        &self,
        from: BackendKind,
        dataset_ids: Option<Vec<Uuid>>,
    ) -> AppResult<Vec<DatasetRecord>> {
        let all = self.catalog.list_datasets().await?;
        let wanted: Option<HashSet<Uuid>> = dataset_ids.map(|ids| ids.into_iter().collect());
        Ok(all
            .into_iter()
            .filter(|d| wanted.as_ref().map_or(true, |w| w.contains(&d.id)))
            .filter(|d| d.locations.iter().any(|l| l.backend == from))
            .collect())
    }

    /// Move one dataset's file. Returns bytes moved, or the failing key and
    /// error. The catalog is updated before any source delete.
    async fn migrate_one(
        &self,
        router: &StorageRouter,
        dataset: DatasetRecord,
        from: BackendKind,
        to: BackendKind,
        delete_source: bool,
    ) -> Result<u64, (String, AppError)> {
        let source_loc = match dataset.locations.iter().find(|l| l.backend == from) {
            Some(loc) => loc.clone(),
            None => return Ok(0),
        };
        let key = source_loc.key.clone();

        if !self.try_lock(dataset.id) {
            return Err((
                key,
                AppError::InvalidInput(format!(
                    "Dataset {} is already being migrated",
                    dataset.id
                )),
            ));
        }
        let result = self
            .copy_and_record(router, &dataset, &source_loc, from, to, delete_source)
            .await;
        self.unlock(dataset.id);
        result.map_err(|e| (source_loc.key, e))
    }

    async fn copy_and_record(
        &self,
        router: &StorageRouter,
        dataset: &DatasetRecord,
        source_loc: &StorageLocation,
        from: BackendKind,
        to: BackendKind,
        delete_source: bool,
    ) -> AppResult<u64> {
        let key = &source_loc.key;
        let source = router.backend(from)?;
        let target = router.backend(to)?;

        let written = target.write_stream(key, source.read(key, 0).await?).await?;
        let bytes = written.size_bytes;

        // Read the copy back through the target for the comparison, so a
        // corrupt write cannot vouch for itself.
        let actual = target.checksum(key).await?;
        if actual != source_loc.checksum {
            let _ = target.delete(key).await;
            return Err(AppError::ChecksumMismatch {
                key: key.clone(),
                expected: source_loc.checksum.clone(),
                actual,
            });
        }

        let mut locations: Vec<StorageLocation> = dataset
            .locations
            .iter()
            .filter(|l| l.backend != to && !(delete_source && l.backend == from))
            .cloned()
            .collect();
        locations.push(written);
        self.catalog.set_locations(dataset.id, locations).await?;

        if delete_source {
            source.delete(key).await?;
        }

        tracing::info!(
            dataset_id = %dataset.id,
            key = %key,
            size_bytes = bytes,
            "Dataset migrated"
        );
        Ok(bytes)
    }
}
