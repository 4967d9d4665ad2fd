//! Model downloads for sonu
//!
//! Fetches whisper model files from an ordered list of mirrors with HTTP
//! range resume, bounded retries and size/checksum verification. A file only
//! appears at its final path after it has been verified.

pub mod catalog;
pub mod config;
pub mod error;
pub mod manager;
pub mod mirrors;
pub mod progress;
pub mod transfer;
pub mod verify;

pub use catalog::{Catalog, ModelDescriptor};
pub use config::DownloaderConfig;
pub use error::{DownloadError, ErrorKind};
pub use manager::{
    DownloadFailure, DownloadResult, DownloadSuccess, ManualDownload, ManualUrlEntry,
    ModelManager,
};
pub use mirrors::{Mirror, MirrorList};
pub use progress::{ProgressEvent, ProgressReporter};
pub use transfer::{Fetch, RangeTransfer, Transferred};
pub use verify::{IntegrityVerifier, Verdict};
