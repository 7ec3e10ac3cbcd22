//! Storage abstraction trait
//!
//! This module defines the capability set every physical backend must
//! implement: write, read (with byte offset where the backend can seek),
//! exists, delete, checksum, and key listing for integrity scans.

use async_trait::async_trait;
use bytes::Bytes;
use datashare_core::models::storage::{BackendKind, StorageLocation};
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

/// Storage operation errors.
///
/// `NotFound` is deliberately separate from `ReadFailed`/`BackendUnavailable`
/// so callers can distinguish a missing object from a backend outage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether the failure is transient (worth a client retry) rather than
    /// a definitive miss or caller mistake.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::ReadFailed(_)
                | StorageError::WriteFailed(_)
                | StorageError::BackendUnavailable(_)
                | StorageError::IoError(_)
        )
    }
}

impl From<StorageError> for datashare_core::AppError {
    fn from(err: StorageError) -> Self {
        use datashare_core::AppError;
        match err {
            StorageError::NotFound(key) => AppError::NotFound(key),
            StorageError::WriteFailed(msg) => AppError::StorageWriteFailed(msg),
            StorageError::DeleteFailed(msg) => AppError::StorageWriteFailed(msg),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::ReadFailed(_)
            | StorageError::BackendUnavailable(_)
            | StorageError::IoError(_) => AppError::StorageReadFailed(err.to_string()),
            StorageError::ConfigError(msg) => AppError::Internal(msg),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked byte stream yielded by reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Storage abstraction trait
///
/// Both backends (local filesystem, S3) implement this identically so the
/// download, migration, and verification paths work against any backend
/// without coupling to implementation details.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write an object, computing its checksum along the way, and return
    /// the resulting location record.
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<StorageLocation>;

    /// Write an object from a byte stream. Backends with a native streaming
    /// upload may override this; the default buffers and delegates to
    /// `write`.
    async fn write_stream(&self, key: &str, stream: ByteStream) -> StorageResult<StorageLocation> {
        let data = collect_stream(stream).await?;
        self.write(key, Bytes::from(data)).await
    }

    /// Open a chunked read stream starting at `offset` bytes.
    ///
    /// Fails with `NotFound` if the object is absent. Both backends support
    /// seeking, so `offset` is honored exactly; synthesized streams higher
    /// up the stack may not be seekable, but that is their concern.
    async fn read(&self, key: &str, offset: u64) -> StorageResult<ByteStream>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete an object. Deleting an absent object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// sha256 of the stored bytes, hex-encoded.
    async fn checksum(&self, key: &str) -> StorageResult<String>;

    /// Size in bytes of an object, if it exists.
    async fn content_length(&self, key: &str) -> StorageResult<u64>;

    /// All keys under a prefix. Used by the integrity verifier to find
    /// physical objects with no owning dataset record.
    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Get the storage backend kind
    fn kind(&self) -> BackendKind;
}

/// Collect an entire byte stream into memory. Helper for checksumming,
/// migration of modest objects, and tests.
pub async fn collect_stream(mut stream: ByteStream) -> StorageResult<Vec<u8>> {
    use futures::StreamExt;

    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}
