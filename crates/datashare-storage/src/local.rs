use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use datashare_core::models::storage::{BackendKind, StorageLocation};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for dataset storage (e.g., "/var/lib/datashare/datasets")
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys with path traversal sequences that could escape the
    /// base storage directory.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if storage_key.contains("..") || storage_key.starts_with('/') {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        let path = self.base_path.join(storage_key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<StorageLocation> {
        let path = self.key_to_path(key)?;
        let size = data.len() as u64;

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();
        let checksum = hex::encode(Sha256::digest(&data));

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(StorageLocation::new(BackendKind::Local, key, size, checksum))
    }

    async fn read(&self, key: &str, offset: u64) -> StorageResult<ByteStream> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let mut file = fs::File::open(&path).await.map_err(|e| {
            StorageError::ReadFailed(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await.map_err(|e| {
                StorageError::ReadFailed(format!(
                    "Failed to seek to {} in {}: {}",
                    offset,
                    path.display(),
                    e
                ))
            })?;
        }

        let reader = tokio_util::io::ReaderStream::with_capacity(
            file,
            datashare_core::constants::STREAM_CHUNK_SIZE,
        );

        let stream = reader.map(|result| {
            result.map_err(|e| StorageError::ReadFailed(format!("Failed to read chunk: {}", e)))
        });

        Ok(Box::pin(stream))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::info!(path = %path.display(), key = %key, "Local storage delete successful");

        Ok(())
    }

    async fn checksum(&self, key: &str) -> StorageResult<String> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let mut file = fs::File::open(&path).await.map_err(|e| {
            StorageError::ReadFailed(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        // Hash in chunks so large datasets never sit in memory whole.
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; datashare_core::constants::STREAM_CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await.map_err(|e| {
                StorageError::ReadFailed(format!("Failed to read {}: {}", path.display(), e))
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        let meta = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::BackendUnavailable(e.to_string())
            }
        })?;
        Ok(meta.len())
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let root = self.key_to_path(prefix)?;
        if !fs::try_exists(&root).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut pending = vec![root];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(|e| {
                StorageError::ReadFailed(format!("Failed to list {}: {}", dir.display(), e))
            })?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                StorageError::ReadFailed(format!("Failed to list {}: {}", dir.display(), e))
            })? {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.base_path) {
                    keys.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::collect_stream;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let data = Bytes::from_static(b"id,name\n1,alpha\n");
        let location = storage.write("datasets/t/data.csv", data.clone()).await.unwrap();

        assert_eq!(location.backend, BackendKind::Local);
        assert_eq!(location.size_bytes, data.len() as u64);
        assert_eq!(location.checksum, hex::encode(Sha256::digest(&data)));

        let read = collect_stream(storage.read("datasets/t/data.csv", 0).await.unwrap())
            .await
            .unwrap();
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn test_read_with_offset_seeks_exactly() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage
            .write("datasets/t/data.bin", Bytes::from_static(b"0123456789"))
            .await
            .unwrap();

        let tail = collect_stream(storage.read("datasets/t/data.bin", 4).await.unwrap())
            .await
            .unwrap();
        assert_eq!(tail, b"456789");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let result = storage.read("datasets/t/missing.csv", 0).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let result = storage.read("../../../etc/passwd", 0).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        assert!(storage.delete("datasets/t/none.csv").await.is_ok());
    }

    #[tokio::test]
    async fn test_checksum_matches_write_record() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let location = storage
            .write("datasets/t/data.csv", Bytes::from_static(b"abc"))
            .await
            .unwrap();
        let checksum = storage.checksum("datasets/t/data.csv").await.unwrap();
        assert_eq!(checksum, location.checksum);
    }

    #[tokio::test]
    async fn test_list_keys_walks_subdirectories() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage
            .write("datasets/a/one.csv", Bytes::from_static(b"1"))
            .await
            .unwrap();
        storage
            .write("datasets/b/two.csv", Bytes::from_static(b"2"))
            .await
            .unwrap();

        let keys = storage.list_keys("datasets").await.unwrap();
        assert_eq!(keys, vec!["datasets/a/one.csv", "datasets/b/two.csv"]);
    }
}
