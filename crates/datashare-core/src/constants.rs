//! Process-wide constants shared across crates.

/// Default TTL for a download token.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Grace period during which expired tokens remain queryable before
/// garbage collection.
pub const TOKEN_GC_GRACE_SECS: u64 = 300;

/// How long a terminal download session is retained so a final poll can
/// still observe its outcome.
pub const SESSION_RETENTION_SECS: u64 = 180;

/// A session with no progress for this long is presumed abandoned and
/// transitioned to interrupted.
pub const SESSION_IDLE_TIMEOUT_SECS: u64 = 120;

/// Trailing window over which the rolling transfer rate is computed.
pub const RATE_WINDOW_SECS: u64 = 5;

/// Chunk size used when streaming bytes out of a backend.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Default ceiling for transforms that must materialize the whole input
/// (zip archives). Inputs larger than this fail with TransformTooLarge.
pub const DEFAULT_TRANSFORM_CEILING_BYTES: u64 = 256 * 1024 * 1024;
