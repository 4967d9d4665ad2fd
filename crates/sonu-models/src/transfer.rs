//! Single-URL HTTP transfer with range resume
//!
//! One call performs one GET (plus any redirect hops) and streams the body
//! into the partial file. Retrying is left to the caller.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Client, Response, StatusCode, Url};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::config::DownloaderConfig;
use crate::error::DownloadError;
use crate::progress::{ProgressReporter, ProgressTracker};

/// Outcome of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transferred {
    /// Bytes written during this call
    pub bytes_written: u64,
    /// Size of the partial file afterwards
    pub file_size: u64,
    /// Total size announced by the server, 0 if unknown
    pub total_size: u64,
    /// URL the body was served from, after redirects
    pub final_url: String,
}

/// Fetches one URL into a partial file
#[trait_variant::make(Fetch: Send)]
pub trait LocalFetch {
    /// Download `url` into `partial_path`, resuming at `start_offset`.
    ///
    /// On error the partial file is left in place.
    async fn fetch(
        &self,
        url: &str,
        partial_path: &Path,
        start_offset: u64,
        source: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<Transferred, DownloadError>;
}

/// reqwest-backed [`Fetch`] implementation
#[derive(Debug, Clone)]
pub struct RangeTransfer {
    client: Client,
    chunk_size: usize,
    max_redirects: usize,
    progress_interval: Duration,
}

impl RangeTransfer {
    pub fn new(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        // redirects are followed by hand so the Range header and the hop
        // bound stay under our control
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.timeout())
            .build()
            .map_err(|e| DownloadError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            chunk_size: config.chunk_size,
            max_redirects: config.max_redirects,
            progress_interval: config.progress_interval(),
        })
    }

    /// Send the GET, following redirects up to the configured bound
    async fn send_following_redirects(
        &self,
        url: &str,
        start_offset: u64,
    ) -> Result<(Response, Url), DownloadError> {
        let mut current = Url::parse(url)
            .map_err(|e| DownloadError::Network(format!("Invalid URL {}: {}", url, e)))?;
        let mut hops = 0;

        loop {
            let mut request = self
                .client
                .get(current.clone())
                .header(ACCEPT, "application/octet-stream");
            if start_offset > 0 {
                request = request.header(RANGE, format!("bytes={}-", start_offset));
            }

            let response = request.send().await?;
            let status = response.status();

            if is_redirect(status) {
                if hops >= self.max_redirects {
                    return Err(DownloadError::TooManyRedirects(self.max_redirects));
                }
                let next = resolve_location(&current, status, response.headers())?;
                debug!("{} redirected to {}", current, next);
                current = next;
                hops += 1;
                continue;
            }

            if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
                return Err(DownloadError::HttpStatus {
                    status: status.as_u16(),
                    reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                });
            }

            return Ok((response, current));
        }
    }
}

impl Fetch for RangeTransfer {
    async fn fetch(
        &self,
        url: &str,
        partial_path: &Path,
        start_offset: u64,
        source: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<Transferred, DownloadError> {
        let (response, final_url) = self.send_following_redirects(url, start_offset).await?;

        let resumed = start_offset > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
        let offset = if resumed { start_offset } else { 0 };
        if start_offset > 0 && !resumed {
            info!(
                "{} ignored range request, restarting {} from zero",
                final_url,
                partial_path.display()
            );
        }

        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        if resumed {
            if let Some((start, _)) = content_range {
                if start != start_offset {
                    return Err(DownloadError::Network(format!(
                        "Server resumed at byte {} instead of {}",
                        start, start_offset
                    )));
                }
            }
        }

        let total = total_size(&response, offset, content_range);
        debug!(
            "{} answered {} (offset {}, total {})",
            final_url,
            response.status(),
            offset,
            total
        );

        let file = if resumed {
            OpenOptions::new().append(true).open(partial_path).await?
        } else {
            if let Some(parent) = partial_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::File::create(partial_path).await?
        };
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);

        let mut tracker = ProgressTracker::new(offset, self.progress_interval);
        progress.report(tracker.started(offset, total, source));

        let streamed = stream_body(response, &mut writer, offset, total, source, &mut tracker, progress).await;
        let downloaded = match streamed {
            Ok(downloaded) => downloaded,
            Err(e) => {
                // keep whatever arrived so the next attempt can resume
                let _ = writer.flush().await;
                return Err(e);
            }
        };

        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        if total > 0 && downloaded < total {
            return Err(DownloadError::Network(format!(
                "Connection closed after {} of {} bytes",
                downloaded, total
            )));
        }

        progress.report(tracker.finished(downloaded, total));

        Ok(Transferred {
            bytes_written: downloaded - offset,
            file_size: downloaded,
            total_size: total,
            final_url: final_url.to_string(),
        })
    }
}

async fn stream_body<W>(
    response: Response,
    writer: &mut W,
    offset: u64,
    total: u64,
    source: &str,
    tracker: &mut ProgressTracker,
    progress: &dyn ProgressReporter,
) -> Result<u64, DownloadError>
where
    W: AsyncWrite + Unpin,
{
    let mut downloaded = offset;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        if let Some(event) = tracker.tick(downloaded, total, source) {
            progress.report(event);
        }
    }

    Ok(downloaded)
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

fn resolve_location(current: &Url, status: StatusCode, headers: &HeaderMap) -> Result<Url, DownloadError> {
    let location = headers
        .get(LOCATION)
        .ok_or_else(|| DownloadError::InvalidRedirect(format!("{} without Location header", status)))?
        .to_str()
        .map_err(|e| DownloadError::InvalidRedirect(format!("unreadable Location header: {}", e)))?;

    current
        .join(location)
        .map_err(|e| DownloadError::InvalidRedirect(format!("{}: {}", location, e)))
}

/// Full file size implied by the response, 0 if unknown
fn total_size(response: &Response, offset: u64, content_range: Option<(u64, Option<u64>)>) -> u64 {
    if response.status() == StatusCode::PARTIAL_CONTENT {
        if let Some((_, Some(total))) = content_range {
            return total;
        }
    }

    match response.content_length() {
        Some(len) => offset + len,
        None => 0,
    }
}

/// `(start, total)` from `bytes <start>-<end>/<total>`; total is `None` for `*`
fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let (range, total) = value.trim().strip_prefix("bytes")?.rsplit_once('/')?;
    let (start, _) = range.split_once('-')?;
    Some((start.trim().parse().ok()?, total.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("bytes 100-199/200"), Some((100, Some(200))));
        assert_eq!(parse_content_range("bytes 0-0/*"), Some((0, None)));
        assert_eq!(parse_content_range("bytes */200"), None);
        assert_eq!(parse_content_range("items 1-2/3"), None);
    }

    #[test]
    fn test_redirect_codes() {
        for code in [301u16, 302, 303, 307, 308] {
            assert!(is_redirect(StatusCode::from_u16(code).unwrap()));
        }
        assert!(!is_redirect(StatusCode::NOT_MODIFIED));
        assert!(!is_redirect(StatusCode::OK));
    }

    #[test]
    fn test_resolve_location() {
        let base = Url::parse("https://mirror.example/models/tiny.gguf?download=true").unwrap();
        let mut headers = HeaderMap::new();

        headers.insert(LOCATION, "/cdn/tiny.gguf".parse().unwrap());
        let next = resolve_location(&base, StatusCode::FOUND, &headers).unwrap();
        assert_eq!(next.as_str(), "https://mirror.example/cdn/tiny.gguf");

        headers.insert(LOCATION, "https://cdn.example/x".parse().unwrap());
        let next = resolve_location(&base, StatusCode::FOUND, &headers).unwrap();
        assert_eq!(next.as_str(), "https://cdn.example/x");

        let empty = HeaderMap::new();
        assert!(matches!(
            resolve_location(&base, StatusCode::FOUND, &empty),
            Err(DownloadError::InvalidRedirect(_))
        ));
    }
}
