use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contract::Acl;
use crate::error::UploadError;
use crate::retry::RetryPolicy;

pub const DEFAULT_BUCKET: &str = "assets.pipelinedeals.com";
pub const DEFAULT_SOURCE_DIR: &str = "./public";
pub const DEFAULT_WORKERS: usize = 50;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
/// Roughly one year.
pub const DEFAULT_CACHE_CONTROL: &str = "max-age=31104000";

/// Whether remote keys carry a leading `/`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStyle {
    /// `prefix/rel/path`
    #[default]
    Plain,
    /// `/prefix/rel/path`
    LeadingSlash,
}

/// A directory to walk and the key prefix its files land under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRoot {
    pub dir: PathBuf,
    #[serde(default)]
    pub key_prefix: String,
}

impl SourceRoot {
    pub fn new(dir: impl Into<PathBuf>, key_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            key_prefix: key_prefix.into(),
        }
    }
}

/// Immutable settings for one upload run. Built once at startup and shared by
/// the driver and all workers.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub bucket: String,
    pub roots: Vec<SourceRoot>,
    pub workers: usize,
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    pub key_style: KeyStyle,
    pub cache_control: String,
    pub acl: Acl,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            roots: vec![SourceRoot::new(DEFAULT_SOURCE_DIR, "")],
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry: RetryPolicy::default(),
            key_style: KeyStyle::default(),
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
            acl: Acl::PublicRead,
        }
    }
}

impl UploaderConfig {
    pub fn validate(&self) -> Result<(), UploadError> {
        let invalid = |message: &str| {
            Err(UploadError::InvalidConfig {
                message: message.to_string(),
            })
        };
        if self.bucket.trim().is_empty() {
            return invalid("bucket must not be empty");
        }
        if self.roots.is_empty() {
            return invalid("at least one source directory is required");
        }
        if self.workers == 0 {
            return invalid("worker count must be at least 1");
        }
        if self.queue_capacity == 0 {
            return invalid("queue capacity must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("max attempts must be at least 1");
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            bucket = %self.bucket,
            roots = self.roots.len(),
            workers = self.workers,
            queue_capacity = self.queue_capacity,
            max_attempts = self.retry.max_attempts,
            acl = %self.acl,
            "Loaded uploader config"
        );
        for root in &self.roots {
            info!(
                dir = %root.dir.display(),
                key_prefix = %root.key_prefix,
                "Configured source root"
            );
        }
        debug!(?self, "Uploader config (full debug)");
    }
}
