//! Datashare Core Library
//!
//! Shared foundation for the datashare download and storage subsystem:
//! configuration, the unified error taxonomy, and the domain models
//! (datasets, download tokens, download sessions, storage locations).

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{BaseConfig, Config};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::storage::{BackendKind, StorageLocation, StorageStrategy};
