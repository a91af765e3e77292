/// # asset-uploader CLI Interface (Module)
///
/// Command parsing and orchestration for the `asset-uploader` binary. All
/// pipeline logic (queue, workers, retry, key derivation) lives in
/// [`asset-uploader-core`]; this module only turns flags and config into an
/// [`UploaderConfig`], connects the S3 sink and prints the outcome.
///
/// ## How To Use
/// - From the shell: `asset-uploader -d ./public -k v42`, or `--help`.
/// - Programmatically: call [`run`] with a parsed [`Cli`], or [`upload`] with
///   any [`BlobSink`] to skip the AWS connection.
///
/// [`asset-uploader-core`]: ../../asset_uploader_core/
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use asset_uploader_core::config::UploaderConfig;
use asset_uploader_core::contract::BlobSink;
use asset_uploader_core::dispatch::{upload_tree, UploadReport};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;

use crate::load_config::{load_config, resolve_config};
use crate::s3::S3BlobSink;

const VERSION_TEXT: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nCopyright (c) PipelineDeals. Released under the MIT license."
);

/// PipelineDeals S3 asset uploader: push a directory tree to an S3 bucket.
#[derive(Parser, Debug)]
#[command(
    name = "asset-uploader",
    version = VERSION_TEXT,
    about = "PipelineDeals S3 asset uploader",
    disable_version_flag = true
)]
pub struct Cli {
    /// Destination bucket [default: assets.pipelinedeals.com]
    #[arg(short = 'b', long)]
    pub bucket: Option<String>,

    /// Directory to upload [default: ./public]
    #[arg(short = 'd', long)]
    pub directory: Option<PathBuf>,

    /// Remote key prefix
    #[arg(short = 'k', long = "key")]
    pub key_prefix: Option<String>,

    /// Number of concurrent upload workers [default: 50]
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Capacity of the pending-upload queue [default: 1000]
    #[arg(short = 'q', long = "queue")]
    pub queue_capacity: Option<usize>,

    /// Attempts per file before giving up [default: 5]
    #[arg(short = 'a', long)]
    pub max_attempts: Option<u32>,

    /// Prefix every remote key with `/`
    #[arg(long)]
    pub leading_slash: bool,

    /// AWS region [default: from the environment, else us-east-1]
    #[arg(short = 'r', long)]
    pub region: Option<String>,

    /// YAML config file; flags override its values
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Print version and license
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    pub version: Option<bool>,
}

/// Async CLI entrypoint for `main()` and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "PipelineDeals S3 asset uploader"
    );

    let file = match &cli.config {
        Some(path) => Some(load_config(path)?),
        None => None,
    };
    let resolved = resolve_config(&cli, file)?;
    resolved.uploader.trace_loaded();

    let sink = match S3BlobSink::connect(resolved.region.clone()).await {
        Ok(sink) => sink,
        Err(e) => {
            tracing::error!(error = %e, "Cannot start without AWS credentials");
            anyhow::bail!(e);
        }
    };

    upload(&resolved.uploader, Arc::new(sink), cli.json).await?;
    Ok(())
}

/// Run the pipeline against `sink`, print the summary and return the report.
///
/// Fails when any file did not make it into the bucket, after listing the
/// failed keys. Ctrl-C cancels the run; queued files are then reported as
/// cancelled.
pub async fn upload(
    config: &UploaderConfig,
    sink: Arc<dyn BlobSink>,
    json: bool,
) -> Result<UploadReport> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling pending uploads");
            on_signal.cancel();
        }
    });

    let result = upload_tree(config, sink, cancel).await;
    signal_task.abort();
    let report = result.map_err(|e| {
        tracing::error!(error = %e, kind = e.kind(), "Upload run aborted");
        anyhow::Error::new(e)
    })?;

    for key in report.failed_keys() {
        eprintln!("FAILED: {key}");
    }
    println!("{}", report.summary());
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if !report.is_success() {
        anyhow::bail!("{} of {} uploads failed", report.failed.len(), report.total());
    }
    Ok(report)
}
