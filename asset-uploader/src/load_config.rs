/// `load_config` module: reads the optional YAML config file and merges it
/// with command-line flags into one immutable [`UploaderConfig`].
///
/// This is the only place where untrusted YAML is parsed. Every field in the
/// file is optional; anything left unset falls back to the built-in defaults
/// from `asset-uploader-core`.
///
/// # Precedence
/// explicit CLI flag > YAML file > built-in default.
///
/// Source roots are the exception to field-by-field merging: if `-d` or `-k`
/// is given on the command line, those two define the single root and the
/// file's `roots` list is ignored.
///
/// # Errors
/// All errors use `anyhow::Error` and surface at the CLI boundary.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use asset_uploader_core::config::{KeyStyle, SourceRoot, UploaderConfig, DEFAULT_SOURCE_DIR};
use asset_uploader_core::contract::Acl;
use serde::Deserialize;
use tracing::{error, info};

use crate::cli::Cli;

/// The YAML file schema.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub max_attempts: Option<u32>,
    pub backoff_step_ms: Option<u64>,
    pub key_style: Option<KeyStyle>,
    pub cache_control: Option<String>,
    pub acl: Option<Acl>,
    #[serde(default)]
    pub roots: Vec<SourceRoot>,
}

/// Everything `run` needs: the core config plus the region for the S3 client.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub uploader: UploaderConfig,
    pub region: Option<String>,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid, empty config.
    if config_content.trim().is_empty() {
        return Ok(FileConfig::default());
    }

    match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

/// Merge flags over the file over the defaults, then validate.
pub fn resolve_config(cli: &Cli, file: Option<FileConfig>) -> Result<ResolvedConfig> {
    let file = file.unwrap_or_default();
    let defaults = UploaderConfig::default();

    let roots = if cli.directory.is_some() || cli.key_prefix.is_some() {
        let dir = cli
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_DIR));
        vec![SourceRoot::new(dir, cli.key_prefix.clone().unwrap_or_default())]
    } else if !file.roots.is_empty() {
        file.roots
    } else {
        defaults.roots
    };

    let key_style = if cli.leading_slash {
        KeyStyle::LeadingSlash
    } else {
        file.key_style.unwrap_or(defaults.key_style)
    };

    let mut retry = defaults.retry;
    if let Some(max_attempts) = cli.max_attempts.or(file.max_attempts) {
        retry.max_attempts = max_attempts;
    }
    if let Some(step_ms) = file.backoff_step_ms {
        retry.backoff_step = Duration::from_millis(step_ms);
    }

    let uploader = UploaderConfig {
        bucket: cli
            .bucket
            .clone()
            .or(file.bucket)
            .unwrap_or(defaults.bucket),
        roots,
        workers: cli.workers.or(file.workers).unwrap_or(defaults.workers),
        queue_capacity: cli
            .queue_capacity
            .or(file.queue_capacity)
            .unwrap_or(defaults.queue_capacity),
        retry,
        key_style,
        cache_control: file.cache_control.unwrap_or(defaults.cache_control),
        acl: file.acl.unwrap_or(defaults.acl),
    };

    if let Err(e) = uploader.validate() {
        error!(error = %e, "Rejected uploader configuration");
        anyhow::bail!(e);
    }

    Ok(ResolvedConfig {
        uploader,
        region: cli.region.clone().or(file.region),
    })
}
