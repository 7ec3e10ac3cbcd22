//! Error types module
//!
//! This module provides the core error types used throughout the datashare
//! subsystem. All errors are unified under the `AppError` enum, which covers
//! the download token lifecycle, storage backends, transforms, and progress
//! sessions.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like an expired token
    Debug,
    /// Warning level - for recoverable issues like a transient backend failure
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented.
/// This trait allows errors to self-describe their HTTP response characteristics.
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "TOKEN_EXPIRED")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested recovery action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Dataset unavailable: {0}")]
    DatasetUnavailable(String),

    #[error("Download token expired: {0}")]
    TokenExpired(String),

    #[error("Download token not found: {0}")]
    TokenNotFound(String),

    #[error("Download token already consumed: {0}")]
    TokenAlreadyConsumed(String),

    #[error("Storage write failed: {0}")]
    StorageWriteFailed(String),

    #[error("Storage read failed: {0}")]
    StorageReadFailed(String),

    #[error("Transform input too large: {size} bytes exceeds ceiling of {ceiling} bytes")]
    TransformTooLarge { size: u64, ceiling: u64 },

    #[error("Checksum mismatch for {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Download session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
/// Reduces duplication in the ErrorMetadata impl; client_message stays per-variant for dynamic content.
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::PermissionDenied(_) => (
            403,
            "PERMISSION_DENIED",
            false,
            Some("Contact the dataset owner to request access"),
            false,
            LogLevel::Debug,
        ),
        AppError::DatasetUnavailable(_) => (
            404,
            "DATASET_UNAVAILABLE",
            false,
            Some("Verify the dataset has an uploaded file"),
            false,
            LogLevel::Warn,
        ),
        AppError::TokenExpired(_) => (
            410,
            "TOKEN_EXPIRED",
            false,
            Some("Request a new download token"),
            false,
            LogLevel::Debug,
        ),
        AppError::TokenNotFound(_) => (
            404,
            "TOKEN_NOT_FOUND",
            false,
            Some("Request a new download token"),
            false,
            LogLevel::Debug,
        ),
        AppError::TokenAlreadyConsumed(_) => (
            409,
            "TOKEN_ALREADY_CONSUMED",
            false,
            Some("Request a new download token"),
            false,
            LogLevel::Debug,
        ),
        AppError::StorageWriteFailed(_) => (
            500,
            "STORAGE_WRITE_FAILED",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::StorageReadFailed(_) => (
            500,
            "STORAGE_READ_FAILED",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::TransformTooLarge { .. } => (
            413,
            "TRANSFORM_TOO_LARGE",
            false,
            Some("Choose a streaming-capable format such as jsonl or csv"),
            false,
            LogLevel::Warn,
        ),
        AppError::ChecksumMismatch { .. } => (
            500,
            "CHECKSUM_MISMATCH",
            false,
            Some("Contact the dataset owner; the stored copy may be corrupt"),
            false,
            LogLevel::Error,
        ),
        AppError::SessionNotFound(_) => (
            404,
            "SESSION_NOT_FOUND",
            false,
            Some("Start the download before polling its progress"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::PermissionDenied(_) => "PermissionDenied",
            AppError::DatasetUnavailable(_) => "DatasetUnavailable",
            AppError::TokenExpired(_) => "TokenExpired",
            AppError::TokenNotFound(_) => "TokenNotFound",
            AppError::TokenAlreadyConsumed(_) => "TokenAlreadyConsumed",
            AppError::StorageWriteFailed(_) => "StorageWriteFailed",
            AppError::StorageReadFailed(_) => "StorageReadFailed",
            AppError::TransformTooLarge { .. } => "TransformTooLarge",
            AppError::ChecksumMismatch { .. } => "ChecksumMismatch",
            AppError::SessionNotFound(_) => "SessionNotFound",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::PermissionDenied(ref msg) => msg.clone(),
            AppError::DatasetUnavailable(ref msg) => msg.clone(),
            AppError::TokenExpired(_) => "Download token has expired".to_string(),
            AppError::TokenNotFound(_) => "Download token not found".to_string(),
            AppError::TokenAlreadyConsumed(_) => {
                "Download token has already been used".to_string()
            }
            AppError::StorageWriteFailed(_) => "Failed to write to storage".to_string(),
            AppError::StorageReadFailed(_) => "Failed to read from storage".to_string(),
            AppError::TransformTooLarge { .. } => self.to_string(),
            AppError::ChecksumMismatch { ref key, .. } => {
                format!("Stored file failed integrity verification: {}", key)
            }
            AppError::SessionNotFound(_) => "Download session not found".to_string(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expired_metadata() {
        let err = AppError::TokenExpired("abc".to_string());
        assert_eq!(err.http_status_code(), 410);
        assert_eq!(err.error_code(), "TOKEN_EXPIRED");
        assert!(!err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_storage_read_failed_is_recoverable() {
        let err = AppError::StorageReadFailed("backend down".to_string());
        assert!(err.is_recoverable());
        assert!(err.suggested_action().is_some());
        assert_eq!(err.client_message(), "Failed to read from storage");
    }

    #[test]
    fn test_checksum_mismatch_message_hides_hashes() {
        let err = AppError::ChecksumMismatch {
            key: "datasets/a.csv".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(err.client_message().contains("datasets/a.csv"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_detailed_message_includes_source_chain() {
        let source = anyhow::anyhow!("inner cause");
        let err = AppError::InternalWithSource {
            message: "outer".to_string(),
            source,
        };
        assert!(err.detailed_message().contains("Caused by: inner cause"));
    }
}
