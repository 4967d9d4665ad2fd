//! sonu model downloader
//!
//! Speaks JSON lines on stdout so the desktop UI can drive it as a child
//! process. Logs go to stderr.

mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use sonu_models::{DownloadResult, DownloaderConfig, ModelManager};
use tracing_subscriber::EnvFilter;

use output::{emit, tagged, JsonLines, ProgressBarReporter};

#[derive(Parser)]
#[command(name = "sonu-fetch")]
#[command(version)]
#[command(about = "Download and inspect sonu speech models")]
struct Cli {
    /// JSON file with downloader settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory models are stored in
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Draw a progress bar on stderr instead of JSON progress lines
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a model, resuming any partial download
    Download { model: String },
    /// Print catalog information for a model
    Info { model: String },
    /// Print direct download links for every model
    ManualUrls,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DownloaderConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DownloaderConfig::default(),
    };
    if let Some(dir) = cli.dir.clone() {
        config.download_dir = Some(dir);
    }

    let manager = ModelManager::new(config).context("failed to set up model manager")?;

    match cli.command {
        Command::Download { model } => {
            let result = if cli.pretty {
                let bar = ProgressBarReporter::new();
                let result = manager.download(&model, &bar).await;
                bar.finish(&result);
                result
            } else {
                manager.download(&model, &JsonLines).await
            };

            emit(&tagged("result", &result)?)?;
            Ok(exit_code(&result))
        }
        Command::Info { model } => match manager.info(&model) {
            Some(descriptor) => {
                let mut value = serde_json::to_value(descriptor)?;
                if let Some(map) = value.as_object_mut() {
                    map.insert("success".to_string(), json!(true));
                    map.insert("sizeString".to_string(), json!(descriptor.size_string()));
                    map.insert("downloaded".to_string(), json!(manager.is_downloaded(&model).await));
                }
                emit(&value)?;
                Ok(ExitCode::SUCCESS)
            }
            None => {
                emit(&json!({ "success": false, "error": "Unknown model" }))?;
                Ok(ExitCode::FAILURE)
            }
        },
        Command::ManualUrls => {
            emit(&json!({ "success": true, "urls": manager.manual_urls() }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(result: &DownloadResult) -> ExitCode {
    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
