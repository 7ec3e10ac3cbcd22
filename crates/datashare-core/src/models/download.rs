use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use super::format::{Compression, DatasetFormat};

/// A single-download credential bound to (dataset, user, format, compression).
///
/// The token id is 32 random bytes hex-encoded (256 bits of entropy).
/// Immutable once issued except for the consumption flag, which is flipped
/// with an atomic compare-and-swap so exactly one of two concurrent
/// consumers of a single-use token wins.
#[derive(Debug)]
pub struct DownloadToken {
    pub token: String,
    pub dataset_id: Uuid,
    pub user_id: Uuid,
    pub format: DatasetFormat,
    pub compression: Compression,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub single_use: bool,
    pub resumable: bool,
    consumed: AtomicBool,
}

impl DownloadToken {
    pub fn new(
        token: String,
        dataset_id: Uuid,
        user_id: Uuid,
        format: DatasetFormat,
        compression: Compression,
        ttl: Duration,
        resumable: bool,
    ) -> Self {
        let now = Utc::now();
        DownloadToken {
            token,
            dataset_id,
            user_id,
            format,
            compression,
            issued_at: now,
            expires_at: now + ttl,
            single_use: true,
            resumable,
            consumed: AtomicBool::new(false),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Acquire)
    }

    /// Mark the token consumed. Returns true if this call did the marking,
    /// false if it was already consumed (idempotent for callers, but the
    /// winner is unambiguous).
    pub fn try_consume(&self) -> bool {
        self.consumed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Cloneable snapshot of a validated token.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TokenInfo {
    pub token: String,
    pub dataset_id: Uuid,
    pub user_id: Uuid,
    pub format: DatasetFormat,
    pub compression: Compression,
    pub expires_at: DateTime<Utc>,
    pub resumable: bool,
    pub consumed: bool,
}

impl From<&DownloadToken> for TokenInfo {
    fn from(t: &DownloadToken) -> Self {
        TokenInfo {
            token: t.token.clone(),
            dataset_id: t.dataset_id,
            user_id: t.user_id,
            format: t.format,
            compression: t.compression,
            expires_at: t.expires_at,
            resumable: t.resumable,
            consumed: t.is_consumed(),
        }
    }
}

/// Download state machine states.
///
/// `Pending` is entered on token validation, `InProgress` on first byte
/// sent. `Interrupted` can re-enter `InProgress` on resume; `Completed` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Interrupted,
}

impl DownloadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Completed | DownloadStatus::Failed)
    }

    /// Whether `retry` is permitted from this state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DownloadStatus::Interrupted | DownloadStatus::Failed)
    }
}

/// Read-only snapshot of a download session, as returned by the progress
/// tracker. The mutable session (including the rolling-rate window) is owned
/// exclusively by the tracker.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DownloadSession {
    pub token: String,
    pub status: DownloadStatus,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// Rolling average over the trailing rate window, bytes per second.
    pub transfer_rate_bps: f64,
    /// `remaining / rate`; omitted while the rate is zero.
    pub eta_seconds: Option<u64>,
    pub error_message: Option<String>,
    pub resume_offset: u64,
}

impl DownloadSession {
    pub fn progress_percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.bytes_transferred as f64 / self.total_bytes as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> DownloadToken {
        DownloadToken::new(
            "deadbeef".to_string(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            DatasetFormat::Csv,
            Compression::None,
            Duration::hours(1),
            true,
        )
    }

    #[test]
    fn test_consume_is_exactly_once() {
        let t = token();
        assert!(!t.is_consumed());
        assert!(t.try_consume());
        assert!(!t.try_consume());
        assert!(t.is_consumed());
    }

    #[test]
    fn test_expiry() {
        let t = token();
        assert!(!t.is_expired(Utc::now()));
        assert!(t.is_expired(Utc::now() + Duration::hours(2)));
    }

    #[test]
    fn test_status_transitions() {
        assert!(DownloadStatus::Completed.is_terminal());
        assert!(DownloadStatus::Failed.is_terminal());
        assert!(!DownloadStatus::Interrupted.is_terminal());
        assert!(DownloadStatus::Interrupted.is_retryable());
        assert!(DownloadStatus::Failed.is_retryable());
        assert!(!DownloadStatus::InProgress.is_retryable());
    }

    #[test]
    fn test_progress_percentage() {
        let s = DownloadSession {
            token: "t".to_string(),
            status: DownloadStatus::InProgress,
            bytes_transferred: 25,
            total_bytes: 100,
            started_at: Utc::now(),
            last_activity_at: Utc::now(),
            transfer_rate_bps: 0.0,
            eta_seconds: None,
            error_message: None,
            resume_offset: 0,
        };
        assert!((s.progress_percentage() - 25.0).abs() < f64::EPSILON);
    }
}
