//! Downloader tunables

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::DownloadError;

/// Downloader configuration.
///
/// Injected into [`ModelManager`](crate::ModelManager) at construction and
/// never mutated afterwards. Every field has a default, so a JSON config file
/// only needs the keys it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Download directory; `None` uses the per-OS data directory
    pub download_dir: Option<PathBuf>,
    /// Write buffer size for streamed bodies
    pub chunk_size: usize,
    /// Read inactivity timeout in seconds
    pub timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Attempts per mirror
    pub max_retries: u32,
    /// Backoff schedule between attempts; the last value repeats
    pub retry_delays_ms: Vec<u64>,
    /// Redirect hops followed before giving up
    pub max_redirects: usize,
    /// Minimum spacing between streaming progress events
    pub progress_interval_ms: u64,
    /// Allowed deviation from the expected size, in percent
    pub size_tolerance_percent: u64,
    /// User-Agent sent with every request
    pub user_agent: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            chunk_size: 8 * 1024 * 1024,
            timeout_secs: 30,
            connect_timeout_secs: 30,
            max_retries: 3,
            retry_delays_ms: vec![1_000, 3_000, 7_000],
            max_redirects: 5,
            progress_interval_ms: 500,
            size_tolerance_percent: 2,
            user_agent: "Sonu/1.0".to_string(),
        }
    }
}

impl DownloaderConfig {
    /// Load a config from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, DownloadError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| DownloadError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the download loop cannot work with
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.max_retries == 0 {
            return Err(DownloadError::Config("max_retries must be at least 1".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(DownloadError::Config("chunk_size must be non-zero".to_string()));
        }
        if self.retry_delays_ms.is_empty() {
            return Err(DownloadError::Config("retry_delays_ms must not be empty".to_string()));
        }
        Ok(())
    }

    /// Resolve the download directory
    pub fn resolve_download_dir(&self) -> Result<PathBuf, DownloadError> {
        match &self.download_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_download_dir(),
        }
    }

    /// Delay before the given attempt (attempt 0 never waits)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.retry_delays_ms.is_empty() {
            return Duration::ZERO;
        }
        let idx = (attempt as usize - 1).min(self.retry_delays_ms.len() - 1);
        Duration::from_millis(self.retry_delays_ms[idx])
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Per-OS application data directory for models
pub fn default_download_dir() -> Result<PathBuf, DownloadError> {
    let dirs = ProjectDirs::from("com", "sonu", "Sonu").ok_or_else(|| {
        DownloadError::CacheDirectoryError("Could not determine data directory".to_string())
    })?;
    Ok(dirs.data_dir().join("models"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let config = DownloaderConfig::default();
        assert_eq!(config.backoff_delay(0), Duration::ZERO);
        assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(3));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(7));
        // capped at the last entry
        assert_eq!(config.backoff_delay(9), Duration::from_secs(7));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DownloaderConfig =
            serde_json::from_str(r#"{"max_retries": 5, "download_dir": "/tmp/models"}"#).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.chunk_size, 8 * 1024 * 1024);
        assert_eq!(config.resolve_download_dir().unwrap(), PathBuf::from("/tmp/models"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let config = DownloaderConfig {
            max_retries: 0,
            ..DownloaderConfig::default()
        };
        assert!(matches!(config.validate(), Err(DownloadError::Config(_))));
    }
}
