//! Download progress events

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Download progress information.
///
/// Every field is always serialized; `percent` and `remaining` are 0 while
/// the total size is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Percent complete (0 - 100)
    pub percent: u8,
    /// Bytes on disk so far, including resumed bytes
    pub bytes_downloaded: u64,
    /// Total bytes, 0 if unknown
    pub bytes_total: u64,
    /// Transfer rate since the previous event, KiB/s
    #[serde(rename = "speedKB")]
    pub speed_kb: f64,
    /// Status message
    pub message: String,
    /// Seconds since the transfer started
    pub elapsed: u64,
    /// Estimated seconds left, 0 if unknown
    pub remaining: u64,
}

impl ProgressEvent {
    /// Event carrying only a status message
    pub fn status(message: impl Into<String>) -> Self {
        Self {
            percent: 0,
            bytes_downloaded: 0,
            bytes_total: 0,
            speed_kb: 0.0,
            message: message.into(),
            elapsed: 0,
            remaining: 0,
        }
    }

    /// Whether the total size is unknown
    pub fn is_indeterminate(&self) -> bool {
        self.bytes_total == 0
    }
}

/// Receiver of progress events.
///
/// Called synchronously from the transfer loop, so implementations must not
/// block.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressReporter for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

impl ProgressReporter for UnboundedSender<ProgressEvent> {
    fn report(&self, event: ProgressEvent) {
        // receiver gone means nobody is watching
        let _ = self.send(event);
    }
}

/// Discards every event
impl ProgressReporter for () {
    fn report(&self, _event: ProgressEvent) {}
}

/// Rate and ETA bookkeeping for one transfer attempt
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    started: Instant,
    last_emit: Instant,
    last_bytes: u64,
    interval: Duration,
}

impl ProgressTracker {
    pub(crate) fn new(start_bytes: u64, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_emit: now,
            last_bytes: start_bytes,
            interval,
        }
    }

    /// Event for the current position if the interval has elapsed
    pub(crate) fn tick(&mut self, downloaded: u64, total: u64, source: &str) -> Option<ProgressEvent> {
        let now = Instant::now();
        let since_last = now.duration_since(self.last_emit);
        if since_last < self.interval {
            return None;
        }

        let speed_kb = interval_speed_kb(downloaded.saturating_sub(self.last_bytes), since_last);
        let percent = percent_of(downloaded, total);
        let remaining = if speed_kb > 0.0 && total > downloaded {
            ((total - downloaded) as f64 / 1024.0 / speed_kb) as u64
        } else {
            0
        };
        let message = if source.is_empty() {
            format!("Downloading... {}%", percent)
        } else {
            format!("Downloading from {}... {}%", source, percent)
        };

        self.last_emit = now;
        self.last_bytes = downloaded;

        Some(ProgressEvent {
            percent,
            bytes_downloaded: downloaded,
            bytes_total: total,
            speed_kb: (speed_kb * 10.0).round() / 10.0,
            message,
            elapsed: now.duration_since(self.started).as_secs(),
            remaining,
        })
    }

    /// Event for the first byte of an attempt
    pub(crate) fn started(&self, downloaded: u64, total: u64, source: &str) -> ProgressEvent {
        let message = if downloaded > 0 {
            format!("Resuming from {} at {} bytes", display_source(source), downloaded)
        } else {
            format!("Connected to {}", display_source(source))
        };
        ProgressEvent {
            percent: percent_of(downloaded, total),
            bytes_downloaded: downloaded,
            bytes_total: total,
            speed_kb: 0.0,
            message,
            elapsed: 0,
            remaining: 0,
        }
    }

    /// Event for a completed attempt
    pub(crate) fn finished(&self, downloaded: u64, total: u64) -> ProgressEvent {
        ProgressEvent {
            percent: 100,
            bytes_downloaded: downloaded,
            bytes_total: total,
            speed_kb: 0.0,
            message: "Download complete".to_string(),
            elapsed: self.started.elapsed().as_secs(),
            remaining: 0,
        }
    }
}

fn display_source(source: &str) -> &str {
    if source.is_empty() {
        "server"
    } else {
        source
    }
}

fn percent_of(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((downloaded as u128 * 100 / total as u128).min(100)) as u8
}

fn interval_speed_kb(bytes: u64, interval: Duration) -> f64 {
    let secs = interval.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs / 1024.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(0, 0), 0);
        assert_eq!(percent_of(50, 200), 25);
        assert_eq!(percent_of(300, 200), 100);
    }

    #[test]
    fn test_tick_respects_interval() {
        let mut tracker = ProgressTracker::new(0, Duration::from_secs(3600));
        assert!(tracker.tick(10, 100, "m").is_none());

        let mut eager = ProgressTracker::new(0, Duration::ZERO);
        let event = eager.tick(50, 100, "Mirror A").unwrap();
        assert_eq!(event.percent, 50);
        assert_eq!(event.message, "Downloading from Mirror A... 50%");
        assert!(!event.is_indeterminate());

        let unknown = eager.tick(70, 0, "Mirror A").unwrap();
        assert!(unknown.is_indeterminate());
        assert_eq!(unknown.percent, 0);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(ProgressEvent::status("hi")).unwrap();
        for key in [
            "percent",
            "bytesDownloaded",
            "bytesTotal",
            "speedKB",
            "message",
            "elapsed",
            "remaining",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn test_channel_reporter_never_blocks() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.report(ProgressEvent::status("one"));
        drop(rx.try_recv().unwrap());
        drop(rx);
        // closed receiver is ignored
        tx.report(ProgressEvent::status("two"));
    }
}
