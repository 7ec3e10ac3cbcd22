//! Datashare Storage Library
//!
//! Uniform storage abstraction over the physical backends that hold dataset
//! bytes: the local filesystem and an S3-compatible object store. Callers
//! never branch on backend kind; all selection logic lives in the
//! [`selector`] module, driven by the process-wide storage strategy.
//!
//! # Storage key format
//!
//! Keys are dataset-scoped: `datasets/{dataset_id}/{filename}`. Keys must
//! not contain `..` or a leading `/`. Key generation is centralized in the
//! `keys` module so both backends stay consistent.

pub mod factory;
pub mod keys;
pub mod local;
pub mod memory;
pub mod s3;
pub mod selector;
pub mod traits;

// Re-export commonly used types
pub use datashare_core::models::storage::{BackendKind, StorageLocation, StorageStrategy};
pub use factory::{create_backends, create_router};
pub use keys::dataset_key;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use s3::S3Storage;
pub use selector::{BackendSelector, StorageRouter};
pub use traits::{collect_stream, ByteStream, Storage, StorageError, StorageResult};
