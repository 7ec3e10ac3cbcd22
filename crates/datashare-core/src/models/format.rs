//! Dataset format and compression catalog.
//!
//! The catalog also encodes resumability: a transfer is byte-resumable only
//! when the bytes on the wire are exactly the bytes in storage (raw
//! passthrough, no compression), because only then can a byte offset be
//! satisfied by seeking the backend. Every transform or compression step
//! synthesizes the stream, so resuming those means re-deriving the output
//! and discarding bytes up to the offset (retryable, not seekable). Zip
//! output additionally requires full materialization and is capped.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Formats a dataset file can be stored in or requested as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    Csv,
    Json,
    Jsonl,
}

impl DatasetFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            DatasetFormat::Csv => "text/csv",
            DatasetFormat::Json => "application/json",
            DatasetFormat::Jsonl => "application/x-ndjson",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DatasetFormat::Csv => "csv",
            DatasetFormat::Json => "json",
            DatasetFormat::Jsonl => "jsonl",
        }
    }
}

impl FromStr for DatasetFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(DatasetFormat::Csv),
            "json" => Ok(DatasetFormat::Json),
            "jsonl" | "ndjson" => Ok(DatasetFormat::Jsonl),
            _ => Err(anyhow::anyhow!("Unsupported dataset format: {}", s)),
        }
    }
}

impl Display for DatasetFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.extension())
    }
}

/// Compression applied to the outgoing stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
    Zip,
}

impl Compression {
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("application/gzip"),
            Compression::Zip => Some("application/zip"),
        }
    }

    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gz"),
            Compression::Zip => Some("zip"),
        }
    }
}

impl FromStr for Compression {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "none" => Ok(Compression::None),
            "gzip" | "gz" => Ok(Compression::Gzip),
            "zip" => Ok(Compression::Zip),
            _ => Err(anyhow::anyhow!("Unsupported compression: {}", s)),
        }
    }
}

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zip => write!(f, "zip"),
        }
    }
}

/// How a (stored format, requested format, compression) combination can be
/// resumed after an interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resumability {
    /// Raw passthrough: resume is a backend seek to the byte offset.
    ByteSeekable,
    /// Synthesized stream: resume re-derives output and discards up to the
    /// offset. Correct but costs a re-read of the source.
    RederiveAndDiscard,
    /// Fully materialized output (zip): retry restarts from zero.
    RestartOnly,
}

impl Resumability {
    /// Whether a retry may continue from a mid-stream byte offset at all.
    pub fn supports_offset(&self) -> bool {
        !matches!(self, Resumability::RestartOnly)
    }
}

/// Classify a transfer. `identity` is true when the stored and requested
/// formats match (no row-wise transform needed).
pub fn classify(identity: bool, compression: Compression) -> Resumability {
    match (identity, compression) {
        (true, Compression::None) => Resumability::ByteSeekable,
        (_, Compression::Zip) => Resumability::RestartOnly,
        _ => Resumability::RederiveAndDiscard,
    }
}
