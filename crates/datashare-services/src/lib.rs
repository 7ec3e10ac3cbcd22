//! Datashare Services Library
//!
//! The download/storage domain services: token issuance and validation,
//! progress tracking, the download orchestrator and its transform pipeline,
//! backend migration, and integrity verification. Collaborator seams
//! (permission checks, the dataset catalog) are traits in [`catalog`].

pub mod catalog;
pub mod download;
pub mod migration;
pub mod progress;
pub mod tokens;
pub mod transform;
pub mod verify;

pub use catalog::{AccessChecker, AllowAllAccess, DatasetCatalog, InMemoryCatalog};
pub use download::{DownloadOrchestrator, DownloadStream, RetryDecision};
pub use migration::{MigrationEngine, MigrationFailure, MigrationReport};
pub use progress::ProgressTracker;
pub use tokens::TokenManager;
pub use transform::{DataStream, TransferPlan};
pub use verify::{IntegrityVerifier, MissingFile, OrphanedFile, VerificationReport};

/// Result type for service operations.
pub type AppResult<T> = Result<T, datashare_core::AppError>;
