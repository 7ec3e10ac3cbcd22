//! Storage integrity verification.
//!
//! Cross-checks the catalog against the physical backends in both
//! directions: every recorded location must have an object behind it with
//! the recorded checksum (missing or corrupted copies are both reported as
//! missing), and every physical object under the dataset prefix must
//! belong to a recorded location (orphans). Verification never mutates
//! anything; orphan removal is a separate, explicitly confirmed call, so
//! running verification twice in a row yields the same report.

use datashare_core::models::storage::BackendKind;
use datashare_core::AppError;
use datashare_storage::{keys, StorageRouter};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::DatasetCatalog;
use crate::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct MissingFile {
    pub dataset_id: Uuid,
    pub backend: BackendKind,
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct OrphanedFile {
    pub backend: BackendKind,
    pub key: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct VerificationReport {
    pub datasets_checked: usize,
    pub files_checked: usize,
    pub missing_files: Vec<MissingFile>,
    pub orphaned_files: Vec<OrphanedFile>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.missing_files.is_empty() && self.orphaned_files.is_empty()
    }
}

pub struct IntegrityVerifier {
    catalog: Arc<dyn DatasetCatalog>,
}

impl IntegrityVerifier {
    pub fn new(catalog: Arc<dyn DatasetCatalog>) -> Self {
        IntegrityVerifier { catalog }
    }

    /// Full two-way scan over every registered backend. Read-only.
    pub async fn verify_all(&self, router: &StorageRouter) -> AppResult<VerificationReport> {
        let datasets = self.catalog.list_datasets().await?;
        let mut report = VerificationReport {
            datasets_checked: datasets.len(),
            ..Default::default()
        };

        // Catalog -> storage: every recorded location must resolve.
        let mut recorded: HashSet<(BackendKind, String)> = HashSet::new();
        for dataset in &datasets {
            for location in &dataset.locations {
                report.files_checked += 1;
                recorded.insert((location.backend, location.key.clone()));

                let problem = match router.backend(location.backend) {
                    Ok(backend) => {
                        if backend.exists(&location.key).await? {
                            let actual = backend.checksum(&location.key).await?;
                            if actual == location.checksum {
                                None
                            } else {
                                Some("checksum mismatch".to_string())
                            }
                        } else {
                            Some("object not found".to_string())
                        }
                    }
                    // A location on an unconfigured backend is unreachable,
                    // which is missing as far as serving goes.
                    Err(_) => Some("backend not configured".to_string()),
                };
                if let Some(reason) = problem {
                    report.missing_files.push(MissingFile {
                        dataset_id: dataset.id,
                        backend: location.backend,
                        key: location.key.clone(),
                        reason,
                    });
                }
            }
        }

        // Storage -> catalog: every physical object must be recorded.
        for kind in router.registered_kinds() {
            let backend = router.backend(kind)?;
            for key in backend.list_keys(keys::DATASET_PREFIX).await? {
                if !recorded.contains(&(kind, key.clone())) {
                    report.orphaned_files.push(OrphanedFile { backend: kind, key });
                }
            }
        }

        report.missing_files.sort();
        report.orphaned_files.sort();

        tracing::info!(
            datasets = report.datasets_checked,
            files = report.files_checked,
            missing = report.missing_files.len(),
            orphaned = report.orphaned_files.len(),
            "Integrity verification finished"
        );
        Ok(report)
    }

    /// Delete the orphans a prior verification found. Re-verifies each key
    /// is still unrecorded before deleting it, so a dataset registered
    /// between the scan and the cleanup is safe.
    pub async fn remove_orphans(
        &self,
        router: &StorageRouter,
        orphans: &[OrphanedFile],
        confirm: bool,
    ) -> AppResult<usize> {
        if !confirm {
            return Err(AppError::InvalidInput(
                "Orphan removal requires explicit confirmation".to_string(),
            ));
        }

        let datasets = self.catalog.list_datasets().await?;
        let recorded: HashSet<(BackendKind, &str)> = datasets
            .iter()
            .flat_map(|d| d.locations.iter().map(|l| (l.backend, l.key.as_str())))
            .collect();

        let mut removed = 0;
        for orphan in orphans {
            if recorded.contains(&(orphan.backend, orphan.key.as_str())) {
                tracing::debug!(key = %orphan.key, "Skipping no-longer-orphaned file");
                continue;
            }
            let backend = router.backend(orphan.backend)?;
            backend.delete(&orphan.key).await?;
            removed += 1;
            tracing::info!(backend = %orphan.backend, key = %orphan.key, "Orphaned file removed");
        }
        Ok(removed)
    }
}
