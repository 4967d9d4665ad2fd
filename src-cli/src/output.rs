//! stdout protocol and terminal progress

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use sonu_models::{DownloadResult, ProgressEvent, ProgressReporter};

/// Write one JSON value as a line and flush
pub fn emit(value: &Value) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}

/// `{"type": kind, ...payload}`
pub fn tagged<T: Serialize>(kind: &str, payload: &T) -> Result<Value> {
    let mut value = serde_json::to_value(payload)?;
    match value.as_object_mut() {
        Some(map) => {
            map.insert("type".to_string(), Value::String(kind.to_string()));
            Ok(value)
        }
        None => Ok(serde_json::json!({ "type": kind, "data": value })),
    }
}

/// Progress as `{"type":"progress", ...}` lines
pub struct JsonLines;

impl ProgressReporter for JsonLines {
    fn report(&self, event: ProgressEvent) {
        let line = tagged("progress", &event).and_then(|v| emit(&v));
        if let Err(e) = line {
            tracing::debug!("Dropped progress event: {}", e);
        }
    }
}

/// indicatif bar on stderr
pub struct ProgressBarReporter {
    bar: ProgressBar,
}

impl ProgressBarReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} | {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Stop the bar and print manual instructions on failure
    pub fn finish(&self, result: &DownloadResult) {
        match result {
            DownloadResult::Success(s) if s.cached => {
                self.bar.finish_with_message(format!("Already downloaded: {}", s.path.display()))
            }
            DownloadResult::Success(s) => self.bar.finish_with_message(format!(
                "Saved {} from {}",
                s.path.display(),
                s.source.as_deref().unwrap_or("unknown source")
            )),
            DownloadResult::Failure(f) => {
                self.bar.abandon_with_message(f.message.clone());
                if let Some(manual) = &f.manual_download {
                    eprintln!();
                    eprintln!("Download {} manually:", manual.filename);
                    eprintln!("  {}", manual.url);
                    eprintln!("  {} ({} bytes)", manual.description, manual.size_bytes);
                }
            }
        }
    }
}

impl Default for ProgressBarReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ProgressBarReporter {
    fn report(&self, event: ProgressEvent) {
        if !event.is_indeterminate() {
            self.bar.set_length(event.bytes_total);
        }
        if event.bytes_downloaded > 0 || event.percent == 100 {
            self.bar.set_position(event.bytes_downloaded);
        }
        self.bar.set_message(event.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_flattens_objects() {
        let event = ProgressEvent::status("Trying mirror");
        let value = tagged("progress", &event).unwrap();
        assert_eq!(value["type"], "progress");
        assert_eq!(value["message"], "Trying mirror");
        assert_eq!(value["bytesTotal"], 0);
    }

    #[test]
    fn test_tagged_wraps_scalars() {
        let value = tagged("note", &42).unwrap();
        assert_eq!(value["data"], 42);
    }
}
