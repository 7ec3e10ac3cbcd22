use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Physical storage backend kinds
///
/// Defined in core because it appears in configuration, location records,
/// and admin API responses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    S3,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "s3" => Ok(BackendKind::S3),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::S3 => write!(f, "s3"),
        }
    }
}

/// Process-wide storage strategy: which backend(s) receive writes and the
/// order reads are attempted. Set at deployment time, swapped only through
/// the explicit admin reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageStrategy {
    /// Single backend: local filesystem.
    LocalPrimary,
    /// Single backend: cloud object store.
    CloudPrimary,
    /// Write both, read local first for latency.
    Hybrid,
    /// Write both, read either; used for failover.
    Redundant,
}

impl StorageStrategy {
    /// Whether this strategy keeps a copy on more than one backend.
    pub fn is_replicated(&self) -> bool {
        matches!(self, StorageStrategy::Hybrid | StorageStrategy::Redundant)
    }
}

impl FromStr for StorageStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local_primary" | "local" => Ok(StorageStrategy::LocalPrimary),
            "cloud_primary" | "cloud" | "s3" => Ok(StorageStrategy::CloudPrimary),
            "hybrid" => Ok(StorageStrategy::Hybrid),
            "redundant" => Ok(StorageStrategy::Redundant),
            _ => Err(anyhow::anyhow!("Invalid storage strategy: {}", s)),
        }
    }
}

impl Display for StorageStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageStrategy::LocalPrimary => write!(f, "local_primary"),
            StorageStrategy::CloudPrimary => write!(f, "cloud_primary"),
            StorageStrategy::Hybrid => write!(f, "hybrid"),
            StorageStrategy::Redundant => write!(f, "redundant"),
        }
    }
}

/// One physical copy of a dataset's bytes.
///
/// A dataset file reference owns one location for single-backend strategies
/// and two for hybrid/redundant. The checksum must match the dataset's
/// recorded hash; divergence is an integrity error.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StorageLocation {
    pub backend: BackendKind,
    /// Path (local) or object key (cloud).
    pub key: String,
    pub size_bytes: u64,
    /// sha256 of the stored bytes, hex-encoded.
    pub checksum: String,
    pub written_at: DateTime<Utc>,
}

impl StorageLocation {
    pub fn new(backend: BackendKind, key: impl Into<String>, size_bytes: u64, checksum: impl Into<String>) -> Self {
        StorageLocation {
            backend,
            key: key.into(),
            size_bytes,
            checksum: checksum.into(),
            written_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_round_trip() {
        for s in ["local_primary", "cloud_primary", "hybrid", "redundant"] {
            let parsed: StorageStrategy = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("tape".parse::<StorageStrategy>().is_err());
    }

    #[test]
    fn test_backend_kinds_sort() {
        let mut kinds = vec![BackendKind::S3, BackendKind::Local];
        kinds.sort();
        assert_eq!(kinds, vec![BackendKind::Local, BackendKind::S3]);
    }

    #[test]
    fn test_replicated_strategies() {
        assert!(StorageStrategy::Hybrid.is_replicated());
        assert!(StorageStrategy::Redundant.is_replicated());
        assert!(!StorageStrategy::LocalPrimary.is_replicated());
        assert!(!StorageStrategy::CloudPrimary.is_replicated());
    }
}
