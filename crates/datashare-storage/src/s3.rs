use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use datashare_core::models::storage::{BackendKind, StorageLocation};
use futures::StreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::{
    Error as ObjectStoreError, GetOptions, GetRange, ObjectStore, PutPayload,
    Result as ObjectResult,
};
use sha2::{Digest, Sha256};

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        // Build AmazonS3 object store from environment and explicit settings.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage { store, bucket })
    }

    fn map_get_error(key: &str, e: ObjectStoreError) -> StorageError {
        match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::ReadFailed(other.to_string()),
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<StorageLocation> {
        let size = data.len() as u64;
        let checksum = hex::encode(Sha256::digest(&data));
        let location = Path::from(key.to_string());
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.put(&location, PutPayload::from(data)).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 write failed"
            );
            StorageError::WriteFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 write successful"
        );

        Ok(StorageLocation::new(BackendKind::S3, key, size, checksum))
    }

    async fn read(&self, key: &str, offset: u64) -> StorageResult<ByteStream> {
        let location = Path::from(key.to_string());

        let options = GetOptions {
            range: (offset > 0).then_some(GetRange::Offset(offset)),
            ..Default::default()
        };

        let result = self
            .store
            .get_opts(&location, options)
            .await
            .map_err(|e| Self::map_get_error(key, e))?;

        let bucket = self.bucket.clone();
        let key_owned = key.to_string();

        let stream = result.into_stream().map(move |res| match res {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::error!(
                    bucket = %bucket,
                    key = %key_owned,
                    error = %e,
                    "S3 stream read error"
                );
                Err(StorageError::ReadFailed(e.to_string()))
            }
        });

        Ok(Box::pin(stream))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let location = Path::from(key.to_string());
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendUnavailable(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let location = Path::from(key.to_string());
        let start = std::time::Instant::now();

        match self.store.delete(&location).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {
                tracing::info!(
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete successful"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    "S3 delete failed"
                );
                Err(StorageError::DeleteFailed(e.to_string()))
            }
        }
    }

    async fn checksum(&self, key: &str) -> StorageResult<String> {
        let location = Path::from(key.to_string());

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| Self::map_get_error(key, e))?;

        // Hash the stream chunk by chunk; large objects never sit in memory whole.
        let mut hasher = Sha256::new();
        let mut stream = result.into_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            hasher.update(&bytes);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let location = Path::from(key.to_string());
        let meta = self.store.head(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::BackendUnavailable(other.to_string()),
        })?;
        Ok(meta.size)
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let prefix_path = Path::from(prefix.to_string());
        let mut listing = self.store.list(Some(&prefix_path));

        let mut keys = Vec::new();
        while let Some(entry) = listing.next().await {
            let meta = entry.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            keys.push(meta.location.to_string());
        }

        keys.sort();
        Ok(keys)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }
}
