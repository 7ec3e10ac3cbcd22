pub mod dataset;
pub mod download;
pub mod format;
pub mod storage;

pub use dataset::{DatasetOperation, DatasetRecord};
pub use download::{DownloadSession, DownloadStatus, DownloadToken, TokenInfo};
pub use format::{Compression, DatasetFormat, Resumability};
pub use storage::{BackendKind, StorageLocation, StorageStrategy};
