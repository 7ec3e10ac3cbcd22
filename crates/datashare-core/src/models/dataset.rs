use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::format::DatasetFormat;
use super::storage::StorageLocation;

/// Operations the external permission service can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetOperation {
    Download,
    Migrate,
    Verify,
}

/// Logical dataset record as exposed by the external catalog.
///
/// Metadata/schema analysis lives outside this subsystem; this is only the
/// slice the download and storage layers consume. `locations` holds the
/// physical copies (one for single-backend strategies, two for
/// hybrid/redundant).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatasetRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub stored_format: DatasetFormat,
    pub size_bytes: u64,
    /// sha256 of the stored bytes, hex-encoded.
    pub checksum: String,
    pub locations: Vec<StorageLocation>,
    pub created_at: DateTime<Utc>,
}

impl DatasetRecord {
    /// Filename offered to the client for the raw stored file.
    pub fn download_filename(&self) -> String {
        format!("{}.{}", self.name, self.stored_format.extension())
    }

    /// Whether any physical copy is recorded at all.
    pub fn has_storage(&self) -> bool {
        !self.locations.is_empty()
    }
}
