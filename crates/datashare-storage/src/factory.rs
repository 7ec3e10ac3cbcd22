//! Backend and router construction from configuration.

use crate::local::LocalStorage;
use crate::s3::S3Storage;
use crate::selector::StorageRouter;
use crate::traits::{Storage, StorageError, StorageResult};
use datashare_core::models::storage::BackendKind;
use datashare_core::Config;
use std::collections::HashMap;
use std::sync::Arc;

/// Construct every backend the configured strategy requires.
pub async fn create_backends(
    config: &Config,
) -> StorageResult<HashMap<BackendKind, Arc<dyn Storage>>> {
    let mut backends: HashMap<BackendKind, Arc<dyn Storage>> = HashMap::new();

    for kind in config.required_backends() {
        match kind {
            BackendKind::Local => {
                let base_path = config.local_storage_path.clone().ok_or_else(|| {
                    StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
                })?;
                let storage = LocalStorage::new(base_path).await?;
                backends.insert(kind, Arc::new(storage));
            }
            BackendKind::S3 => {
                let bucket = config.s3_bucket.clone().ok_or_else(|| {
                    StorageError::ConfigError("S3_BUCKET not configured".to_string())
                })?;
                let region = config.s3_region.clone().ok_or_else(|| {
                    StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
                })?;
                let storage = S3Storage::new(bucket, region, config.s3_endpoint.clone()).await?;
                backends.insert(kind, Arc::new(storage));
            }
        }
    }

    Ok(backends)
}

/// Build a router for the configured strategy and its backends.
pub async fn create_router(config: &Config) -> StorageResult<Arc<StorageRouter>> {
    let backends = create_backends(config).await?;

    tracing::info!(
        strategy = %config.storage_strategy,
        backends = ?backends.keys().collect::<Vec<_>>(),
        "Storage router initialized"
    );

    Ok(Arc::new(StorageRouter::new(
        config.storage_strategy,
        backends,
    )))
}
