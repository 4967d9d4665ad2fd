//! Model download manager
//!
//! Drives one download per call: catalog lookup, cache check, then every
//! mirror in order with bounded retries. Only a file that passed
//! verification is ever moved to the final path.

use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, ModelDescriptor};
use crate::config::DownloaderConfig;
use crate::error::{DownloadError, ErrorKind};
use crate::mirrors::{Mirror, MirrorList};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::transfer::{Fetch, RangeTransfer, Transferred};
use crate::verify::IntegrityVerifier;

const PARTIAL_SUFFIX: &str = ".part";

/// Paths and counters for one `download` call.
///
/// Nothing here outlives the call; a later run rediscovers progress from the
/// partial file on disk.
#[derive(Debug, Clone)]
pub(crate) struct DownloadState {
    target_path: PathBuf,
    partial_path: PathBuf,
    bytes_transferred: u64,
    /// 0 until a server announces a size
    total_bytes: u64,
}

impl DownloadState {
    fn new(target_path: PathBuf) -> Self {
        let partial_path = partial_path_for(&target_path);
        Self {
            target_path,
            partial_path,
            bytes_transferred: 0,
            total_bytes: 0,
        }
    }

    /// Current size of the partial file, 0 if absent
    async fn resume_offset(&self) -> u64 {
        fs::metadata(&self.partial_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

/// Enough information for a human to fetch the file by hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualDownload {
    pub url: String,
    pub filename: String,
    pub size_bytes: u64,
    pub description: String,
}

impl From<&ModelDescriptor> for ManualDownload {
    fn from(model: &ModelDescriptor) -> Self {
        Self {
            url: model.manual_url.clone(),
            filename: model.filename.clone(),
            size_bytes: model.size_bytes,
            description: model.description.clone(),
        }
    }
}

/// Entry of [`ModelManager::manual_urls`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualUrlEntry {
    pub name: String,
    pub filename: String,
    pub size_bytes: u64,
    pub description: String,
    pub recommended_for: String,
    pub url: String,
}

/// Successful download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSuccess {
    pub model: String,
    pub path: PathBuf,
    pub cached: bool,
    pub size_bytes: u64,
    /// Mirror that served the file; `None` for cache hits
    pub source: Option<String>,
}

/// Terminal failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFailure {
    pub model: String,
    pub error: ErrorKind,
    pub message: String,
    pub manual_download: Option<ManualDownload>,
}

/// Result of [`ModelManager::download`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "DownloadResultWire")]
pub enum DownloadResult {
    Success(DownloadSuccess),
    Failure(DownloadFailure),
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadResult::Success(_))
    }

    pub fn success(&self) -> Option<&DownloadSuccess> {
        match self {
            DownloadResult::Success(s) => Some(s),
            DownloadResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&DownloadFailure> {
        match self {
            DownloadResult::Success(_) => None,
            DownloadResult::Failure(f) => Some(f),
        }
    }

    fn failed(model: &str, error: &DownloadError, manual_download: Option<ManualDownload>) -> Self {
        DownloadResult::Failure(DownloadFailure {
            model: model.to_string(),
            error: error.kind(),
            message: error.to_string(),
            manual_download,
        })
    }
}

/// Flat JSON shape consumed by the UI
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadResultWire {
    success: bool,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    manual_download: Option<ManualDownload>,
}

impl From<DownloadResult> for DownloadResultWire {
    fn from(result: DownloadResult) -> Self {
        match result {
            DownloadResult::Success(s) => Self {
                success: true,
                model: s.model,
                path: Some(s.path),
                cached: Some(s.cached),
                size_bytes: Some(s.size_bytes),
                source: s.source,
                error: None,
                message: None,
                manual_download: None,
            },
            DownloadResult::Failure(f) => Self {
                success: false,
                model: f.model,
                path: None,
                cached: None,
                size_bytes: None,
                source: None,
                error: Some(f.error),
                message: Some(f.message),
                manual_download: f.manual_download,
            },
        }
    }
}

/// Model download manager
pub struct ModelManager<F = RangeTransfer> {
    /// Download directory path
    download_dir: PathBuf,
    config: DownloaderConfig,
    catalog: Catalog,
    mirrors: MirrorList,
    verifier: IntegrityVerifier,
    fetcher: F,
}

impl ModelManager<RangeTransfer> {
    /// Create a manager with the built-in catalog and mirrors
    pub fn new(config: DownloaderConfig) -> Result<Self, DownloadError> {
        Self::with_sources(config, Catalog::builtin(), MirrorList::builtin())
    }

    /// Create a manager with a custom catalog and mirror list
    pub fn with_sources(
        config: DownloaderConfig,
        catalog: Catalog,
        mirrors: MirrorList,
    ) -> Result<Self, DownloadError> {
        let fetcher = RangeTransfer::new(&config)?;
        ModelManager::with_fetcher(config, catalog, mirrors, fetcher)
    }
}

impl<F: Fetch> ModelManager<F> {
    /// Create a manager around an arbitrary transfer implementation
    pub fn with_fetcher(
        config: DownloaderConfig,
        catalog: Catalog,
        mirrors: MirrorList,
        fetcher: F,
    ) -> Result<Self, DownloadError> {
        config.validate()?;
        let download_dir = config.resolve_download_dir()?;
        let verifier = IntegrityVerifier::new(config.size_tolerance_percent);

        Ok(Self {
            download_dir,
            config,
            catalog,
            mirrors,
            verifier,
            fetcher,
        })
    }

    /// Get the download directory path
    pub fn download_directory(&self) -> &Path {
        &self.download_dir
    }

    /// Get the path where a model would be stored
    pub fn model_path(&self, model: &ModelDescriptor) -> PathBuf {
        self.download_dir.join(&model.filename)
    }

    /// Get the in-flight path for a model
    pub fn partial_path(&self, model: &ModelDescriptor) -> PathBuf {
        partial_path_for(&self.model_path(model))
    }

    /// Get model info by ID
    pub fn info(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.catalog.lookup(model_id)
    }

    /// Manual download details for every catalog entry
    pub fn manual_urls(&self) -> BTreeMap<String, ManualUrlEntry> {
        self.catalog
            .iter()
            .map(|m| {
                (
                    m.id.clone(),
                    ManualUrlEntry {
                        name: m.id.clone(),
                        filename: m.filename.clone(),
                        size_bytes: m.size_bytes,
                        description: m.description.clone(),
                        recommended_for: m.recommended_for.clone(),
                        url: m.manual_url.clone(),
                    },
                )
            })
            .collect()
    }

    /// Check if a verified copy of the model is on disk
    pub async fn is_downloaded(&self, model_id: &str) -> bool {
        match self.catalog.lookup(model_id) {
            Some(model) => {
                self.verifier
                    .verify(&self.model_path(model), model.size_bytes, model.sha256.as_deref())
                    .await
            }
            None => false,
        }
    }

    /// Delete a model and any partial download of it
    pub async fn delete(&self, model_id: &str) -> Result<(), DownloadError> {
        let model = self
            .catalog
            .lookup(model_id)
            .ok_or_else(|| DownloadError::UnknownModel(model_id.to_string()))?;

        remove_if_exists(&self.model_path(model)).await?;
        remove_if_exists(&self.partial_path(model)).await?;
        info!("Model {} deleted", model.name);
        Ok(())
    }

    /// Download a model, reporting progress along the way.
    ///
    /// Never fails with an error value: every outcome, including unknown
    /// models and exhausted mirrors, comes back as a [`DownloadResult`].
    pub async fn download(&self, model_id: &str, progress: &dyn ProgressReporter) -> DownloadResult {
        let Some(model) = self.catalog.lookup(model_id) else {
            let err = DownloadError::UnknownModel(model_id.to_string());
            warn!("{}", err);
            return DownloadResult::failed(model_id, &err, None);
        };

        let mut state = DownloadState::new(self.model_path(model));

        if let Some(hit) = self.check_cache(model, &state).await {
            return hit;
        }

        if let Err(e) = fs::create_dir_all(&self.download_dir).await {
            warn!("Cannot create {}: {}", self.download_dir.display(), e);
        }

        let mut last_error: Option<DownloadError> = None;
        for mirror in self.mirrors.endpoints() {
            let url = mirror.request_url(&model.filename);

            for attempt in 0..self.config.max_retries {
                if attempt > 0 {
                    tokio::time::sleep(self.config.backoff_delay(attempt)).await;
                }

                progress.report(ProgressEvent::status(format!(
                    "Trying {} (attempt {}/{})...",
                    mirror.name,
                    attempt + 1,
                    self.config.max_retries
                )));

                match self.attempt(model, mirror, &url, &mut state, progress).await {
                    Ok(transferred) => {
                        info!(
                            "Model {} downloaded from {} ({} new bytes via {})",
                            model.name, mirror.name, transferred.bytes_written, transferred.final_url
                        );
                        return DownloadResult::Success(DownloadSuccess {
                            model: model.id.clone(),
                            path: state.target_path,
                            cached: false,
                            size_bytes: state.bytes_transferred,
                            source: Some(mirror.name.clone()),
                        });
                    }
                    Err(e) => {
                        warn!(
                            "{} attempt {}/{} for {} failed: {}",
                            mirror.name,
                            attempt + 1,
                            self.config.max_retries,
                            model.id,
                            e
                        );
                        progress.report(ProgressEvent::status(e.to_string()));
                        last_error = Some(e);
                    }
                }
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no mirrors configured".to_string());
        let err = DownloadError::AllMirrorsExhausted {
            model: model.id.clone(),
            last_error,
        };
        warn!("{}", err);
        DownloadResult::failed(&model.id, &err, Some(ManualDownload::from(model)))
    }

    /// Return a cache hit, or clear an invalid file out of the way
    async fn check_cache(&self, model: &ModelDescriptor, state: &DownloadState) -> Option<DownloadResult> {
        let size_bytes = match fs::metadata(&state.target_path).await {
            Ok(meta) => meta.len(),
            Err(_) => return None,
        };

        if self
            .verifier
            .verify(&state.target_path, model.size_bytes, model.sha256.as_deref())
            .await
        {
            info!("Model {} already downloaded", model.name);
            return Some(DownloadResult::Success(DownloadSuccess {
                model: model.id.clone(),
                path: state.target_path.clone(),
                cached: true,
                size_bytes,
                source: None,
            }));
        }

        warn!(
            "Existing {} failed verification, removing it",
            state.target_path.display()
        );
        if let Err(e) = remove_if_exists(&state.target_path).await {
            warn!("Could not remove {}: {}", state.target_path.display(), e);
        }
        None
    }

    /// One transfer + verify + publish cycle
    async fn attempt(
        &self,
        model: &ModelDescriptor,
        mirror: &Mirror,
        url: &str,
        state: &mut DownloadState,
        progress: &dyn ProgressReporter,
    ) -> Result<Transferred, DownloadError> {
        let offset = state.resume_offset().await;
        debug!("Fetching {} from offset {}", url, offset);

        let transferred = match self
            .fetcher
            .fetch(url, &state.partial_path, offset, &mirror.name, progress)
            .await
        {
            Ok(t) => t,
            Err(DownloadError::HttpStatus { status: 416, reason }) if offset > 0 => {
                // the partial is longer than the remote file
                remove_if_exists(&state.partial_path).await?;
                return Err(DownloadError::HttpStatus { status: 416, reason });
            }
            Err(e) => return Err(e),
        };
        state.bytes_transferred = transferred.file_size;
        state.total_bytes = transferred.total_size;

        let verdict = self
            .verifier
            .inspect(&state.partial_path, model.size_bytes, model.sha256.as_deref())
            .await?;
        if !verdict.is_valid() {
            debug!(
                "{} failed verification after {} of {} bytes",
                state.partial_path.display(),
                state.bytes_transferred,
                state.total_bytes
            );
            remove_if_exists(&state.partial_path).await?;
            return Err(DownloadError::VerificationFailed {
                mirror: mirror.name.clone(),
                reason: verdict.to_string(),
            });
        }

        remove_if_exists(&state.target_path).await?;
        fs::rename(&state.partial_path, &state.target_path).await?;
        Ok(transferred)
    }
}

fn partial_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
