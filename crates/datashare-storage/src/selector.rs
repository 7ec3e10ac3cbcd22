//! Backend selection and strategy fan-out.
//!
//! All branching on backend kind lives here. `BackendSelector` answers the
//! pure policy questions (which backends receive a write, in what order
//! reads are attempted) and `StorageRouter` executes them against the
//! registered backends.

use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use bytes::Bytes;
use datashare_core::models::storage::{BackendKind, StorageLocation, StorageStrategy};
use std::collections::HashMap;
use std::sync::Arc;

/// Pure strategy policy: no I/O, trivially testable.
#[derive(Debug, Clone, Copy)]
pub struct BackendSelector;

impl BackendSelector {
    /// Ordered backends that receive a write. The first entry is the
    /// primary; its failure fails the whole write. Later entries are
    /// best-effort replicas.
    pub fn write_targets(strategy: StorageStrategy) -> Vec<BackendKind> {
        match strategy {
            StorageStrategy::LocalPrimary => vec![BackendKind::Local],
            StorageStrategy::CloudPrimary => vec![BackendKind::S3],
            StorageStrategy::Hybrid | StorageStrategy::Redundant => {
                vec![BackendKind::Local, BackendKind::S3]
            }
        }
    }

    /// Ordered backends to try for a read, stopping at the first that
    /// has the object. Local is preferred wherever it participates, for
    /// latency.
    pub fn read_order(strategy: StorageStrategy) -> Vec<BackendKind> {
        match strategy {
            StorageStrategy::LocalPrimary => vec![BackendKind::Local, BackendKind::S3],
            StorageStrategy::CloudPrimary => vec![BackendKind::S3, BackendKind::Local],
            StorageStrategy::Hybrid => vec![BackendKind::Local, BackendKind::S3],
            StorageStrategy::Redundant => vec![BackendKind::Local, BackendKind::S3],
        }
    }
}

/// Executes the strategy against the registered physical backends.
///
/// Immutable once built; a configuration reload constructs a fresh router
/// and the owner swaps it in, so no request ever observes a torn strategy.
pub struct StorageRouter {
    strategy: StorageStrategy,
    backends: HashMap<BackendKind, Arc<dyn Storage>>,
}

impl StorageRouter {
    pub fn new(
        strategy: StorageStrategy,
        backends: HashMap<BackendKind, Arc<dyn Storage>>,
    ) -> Self {
        StorageRouter { strategy, backends }
    }

    pub fn strategy(&self) -> StorageStrategy {
        self.strategy
    }

    pub fn backend(&self, kind: BackendKind) -> StorageResult<Arc<dyn Storage>> {
        self.backends.get(&kind).cloned().ok_or_else(|| {
            StorageError::ConfigError(format!("No {} backend registered", kind))
        })
    }

    pub fn registered_kinds(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<_> = self.backends.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Primary backend for the current strategy.
    pub fn primary(&self) -> StorageResult<Arc<dyn Storage>> {
        let kind = BackendSelector::write_targets(self.strategy)[0];
        self.backend(kind)
    }

    /// Whether a backend is registered and answering.
    pub async fn is_available(&self, kind: BackendKind) -> bool {
        match self.backends.get(&kind) {
            Some(backend) => backend.exists("datasets/.healthcheck").await.is_ok(),
            None => false,
        }
    }

    /// Write an object under the current strategy.
    ///
    /// The primary target must succeed or the whole operation fails with
    /// its error. A secondary failure in hybrid/redundant mode is logged
    /// and skipped (best-effort replication); the returned locations are
    /// the copies that actually landed.
    pub async fn write(&self, key: &str, data: Bytes) -> StorageResult<Vec<StorageLocation>> {
        let targets = BackendSelector::write_targets(self.strategy);
        let mut locations = Vec::with_capacity(targets.len());

        for (i, kind) in targets.iter().enumerate() {
            let backend = self.backend(*kind)?;
            match backend.write(key, data.clone()).await {
                Ok(location) => locations.push(location),
                Err(e) if i == 0 => {
                    return Err(StorageError::WriteFailed(format!(
                        "Primary backend {} write failed for {}: {}",
                        kind, key, e
                    )));
                }
                Err(e) => {
                    tracing::warn!(
                        backend = %kind,
                        key = %key,
                        error = %e,
                        "Secondary backend write failed, continuing with primary copy"
                    );
                }
            }
        }

        Ok(locations)
    }

    /// Open a read stream against a dataset's recorded copies, probing them
    /// in read order. Physical objects outside the recorded locations are
    /// never served, so a migration copy that has not passed checksum
    /// verification yet cannot satisfy a read under its final key.
    pub async fn read_recorded(
        &self,
        locations: &[StorageLocation],
        offset: u64,
    ) -> StorageResult<ByteStream> {
        let mut last_error: Option<StorageError> = None;

        for kind in BackendSelector::read_order(self.strategy) {
            let Some(location) = locations.iter().find(|l| l.backend == kind) else {
                continue;
            };
            let Some(backend) = self.backends.get(&kind) else {
                continue;
            };
            match backend.exists(&location.key).await {
                Ok(true) => {
                    tracing::debug!(backend = %kind, key = %location.key, "Resolved read backend");
                    return backend.read(&location.key, offset).await;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        backend = %kind,
                        key = %location.key,
                        error = %e,
                        "Backend check failed, trying next recorded copy"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            // Every reachable copy said "absent".
            None => Err(StorageError::NotFound(
                locations
                    .first()
                    .map(|l| l.key.clone())
                    .unwrap_or_default(),
            )),
            Some(e) => Err(StorageError::BackendUnavailable(format!(
                "No backend could serve a recorded copy: {}",
                e
            ))),
        }
    }

    /// Delete an object from every registered backend that has it.
    pub async fn delete_everywhere(&self, key: &str) -> StorageResult<()> {
        for backend in self.backends.values() {
            backend.delete(key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use crate::traits::collect_stream;

    fn router(strategy: StorageStrategy) -> StorageRouter {
        let mut backends: HashMap<BackendKind, Arc<dyn Storage>> = HashMap::new();
        backends.insert(
            BackendKind::Local,
            Arc::new(MemoryStorage::new(BackendKind::Local)),
        );
        backends.insert(BackendKind::S3, Arc::new(MemoryStorage::new(BackendKind::S3)));
        StorageRouter::new(strategy, backends)
    }

    #[test]
    fn test_write_targets_per_strategy() {
        assert_eq!(
            BackendSelector::write_targets(StorageStrategy::LocalPrimary),
            vec![BackendKind::Local]
        );
        assert_eq!(
            BackendSelector::write_targets(StorageStrategy::CloudPrimary),
            vec![BackendKind::S3]
        );
        assert_eq!(
            BackendSelector::write_targets(StorageStrategy::Hybrid),
            vec![BackendKind::Local, BackendKind::S3]
        );
        assert_eq!(
            BackendSelector::write_targets(StorageStrategy::Redundant),
            vec![BackendKind::Local, BackendKind::S3]
        );
    }

    #[test]
    fn test_read_order_prefers_local() {
        assert_eq!(
            BackendSelector::read_order(StorageStrategy::Hybrid)[0],
            BackendKind::Local
        );
        assert_eq!(
            BackendSelector::read_order(StorageStrategy::CloudPrimary)[0],
            BackendKind::S3
        );
    }

    #[tokio::test]
    async fn test_hybrid_write_lands_on_both_backends() {
        let router = router(StorageStrategy::Hybrid);
        let locations = router
            .write("datasets/x/data.csv", Bytes::from_static(b"a,b\n1,2\n"))
            .await
            .unwrap();

        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].checksum, locations[1].checksum);
        for kind in [BackendKind::Local, BackendKind::S3] {
            assert!(router
                .backend(kind)
                .unwrap()
                .exists("datasets/x/data.csv")
                .await
                .unwrap());
        }
    }

    #[tokio::test]
    async fn test_read_falls_back_when_local_copy_disappears() {
        let router = router(StorageStrategy::Hybrid);
        let locations = router
            .write("datasets/x/data.csv", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        // Local copy deleted out-of-band; reads must transparently fall back.
        router
            .backend(BackendKind::Local)
            .unwrap()
            .delete("datasets/x/data.csv")
            .await
            .unwrap();

        let bytes = collect_stream(router.read_recorded(&locations, 0).await.unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, b"payload");
    }

    #[tokio::test]
    async fn test_read_ignores_unrecorded_objects() {
        let router = router(StorageStrategy::Hybrid);

        // Only the s3 copy is recorded; the local object under the same key
        // is a half-written stray and must never be served, even though
        // read order prefers local.
        let s3 = router.backend(BackendKind::S3).unwrap();
        let recorded = s3
            .write("datasets/x/data.csv", Bytes::from_static(b"full payload"))
            .await
            .unwrap();
        router
            .backend(BackendKind::Local)
            .unwrap()
            .write("datasets/x/data.csv", Bytes::from_static(b"full"))
            .await
            .unwrap();

        let bytes = collect_stream(router.read_recorded(&[recorded], 0).await.unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, b"full payload");
    }

    #[tokio::test]
    async fn test_missing_everywhere_is_not_found() {
        let router = router(StorageStrategy::Redundant);
        let ghost = StorageLocation::new(BackendKind::Local, "datasets/x/ghost.csv", 0, "");
        let result = router.read_recorded(&[ghost], 0).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_primary_write_failure_fails_the_write() {
        // Only register the secondary; the primary is unregistered so the
        // write must fail outright rather than limp along replica-only.
        let mut backends: HashMap<BackendKind, Arc<dyn Storage>> = HashMap::new();
        backends.insert(BackendKind::S3, Arc::new(MemoryStorage::new(BackendKind::S3)));
        let router = StorageRouter::new(StorageStrategy::Hybrid, backends);

        let result = router.write("datasets/x/a", Bytes::from_static(b"x")).await;
        assert!(result.is_err());
    }
}
