//! Model download error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Model id is not in the catalog
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Connection, timeout or body stream failure
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a status we cannot use
    #[error("HTTP {status}: {reason}")]
    HttpStatus {
        status: u16,
        reason: String,
    },

    /// Redirect chain longer than the configured bound
    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),

    /// Redirect without a usable Location header
    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),

    /// Downloaded file failed the size or hash check
    #[error("File verification failed for {mirror}: {reason}")]
    VerificationFailed { mirror: String, reason: String },

    /// Every mirror and attempt failed
    #[error("Failed to download {model} from all mirrors: {last_error}")]
    AllMirrorsExhausted {
        model: String,
        last_error: String,
    },

    /// Download directory error
    #[error("Failed to access download directory: {0}")]
    CacheDirectoryError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Classification reported to the UI
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::UnknownModel(_) => ErrorKind::UnknownModel,
            DownloadError::Network(_)
            | DownloadError::TooManyRedirects(_)
            | DownloadError::InvalidRedirect(_) => ErrorKind::NetworkError,
            DownloadError::HttpStatus { .. } => ErrorKind::HttpStatusError,
            DownloadError::VerificationFailed { .. } => ErrorKind::VerificationFailure,
            DownloadError::AllMirrorsExhausted { .. } => ErrorKind::AllMirrorsExhausted,
            DownloadError::CacheDirectoryError(_) | DownloadError::Io(_) => ErrorKind::IoError,
            DownloadError::Config(_) => ErrorKind::ConfigError,
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DownloadError::Network(format!("request timed out: {}", err))
        } else if err.is_connect() {
            DownloadError::Network(format!("connection failed: {}", err))
        } else {
            DownloadError::Network(err.to_string())
        }
    }
}

/// Error classification carried by a failed download result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownModel,
    NetworkError,
    HttpStatusError,
    VerificationFailure,
    AllMirrorsExhausted,
    IoError,
    ConfigError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = DownloadError::HttpStatus {
            status: 503,
            reason: "Service Unavailable".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::HttpStatusError);
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");

        assert_eq!(DownloadError::TooManyRedirects(5).kind(), ErrorKind::NetworkError);

        let err = DownloadError::VerificationFailed {
            mirror: "Mirror A".to_string(),
            reason: "size 10 bytes, expected 100".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::VerificationFailure);
        assert_eq!(
            err.to_string(),
            "File verification failed for Mirror A: size 10 bytes, expected 100"
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::AllMirrorsExhausted).unwrap(),
            "\"all_mirrors_exhausted\""
        );
    }
}
