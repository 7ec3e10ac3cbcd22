//! In-memory storage backend.
//!
//! Stands in for a physical backend in tests and local development wiring,
//! the same way `object_store` ships an in-memory store. It can impersonate
//! either backend kind so routing logic is testable without a real bucket.

use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use datashare_core::models::storage::{BackendKind, StorageLocation};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct MemoryStorage {
    kind: BackendKind,
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemoryStorage {
    pub fn new(kind: BackendKind) -> Self {
        MemoryStorage {
            kind,
            objects: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<StorageLocation> {
        let size = data.len() as u64;
        let checksum = hex::encode(Sha256::digest(&data));
        self.objects.write().await.insert(key.to_string(), data);
        Ok(StorageLocation::new(self.kind, key, size, checksum))
    }

    async fn read(&self, key: &str, offset: u64) -> StorageResult<ByteStream> {
        let objects = self.objects.read().await;
        let data = objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        drop(objects);

        let tail = data.slice((offset as usize).min(data.len())..);
        Ok(Box::pin(futures::stream::once(async move { Ok(tail) })))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn checksum(&self, key: &str) -> StorageResult<String> {
        let objects = self.objects.read().await;
        let data = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(hex::encode(Sha256::digest(data)))
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let objects = self.objects.read().await;
        let data = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(data.len() as u64)
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }
}
