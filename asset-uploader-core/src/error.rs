//! Error types for the upload pipeline.
//!
//! Errors fall in two groups:
//! - process-level ([`UploadError::Credential`], [`UploadError::Enumeration`],
//!   [`UploadError::InvalidConfig`]) abort a run before any upload starts;
//! - unit-level (everything else) belong to a single file and are reported
//!   in the [`UploadReport`](crate::dispatch::UploadReport) without touching
//!   sibling uploads.

use std::path::PathBuf;

use thiserror::Error;

/// Failure returned by a [`BlobSink`](crate::contract::BlobSink) write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SinkError {
    pub message: String,
    /// Whether the same request may succeed if sent again.
    pub retryable: bool,
}

impl SinkError {
    /// A transient failure (5xx, throttling, timeout, connection reset).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that will not go away on retry (bad request, access denied).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    /// Credentials could not be resolved or were rejected.
    #[error("Credential error: {message}")]
    Credential { message: String },

    /// A source root could not be walked.
    #[error("Cannot enumerate {}: {message}", root.display())]
    Enumeration { root: PathBuf, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The local path cannot be mapped to a key inside the bucket.
    #[error("Cannot derive key for {}: {message}", path.display())]
    InvalidKey { path: PathBuf, message: String },

    #[error("I/O error for {}: {source}", path.display())]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Non-retryable failure from the sink.
    #[error("Remote write failed for {key}: {source}")]
    RemoteWrite {
        key: String,
        #[source]
        source: SinkError,
    },

    #[error("Upload of {key} failed after {attempts} attempts: {last_error}")]
    ExhaustedRetry {
        key: String,
        attempts: u32,
        last_error: SinkError,
    },

    #[error("Upload of {key} cancelled")]
    Cancelled { key: String },

    #[error("Worker panicked while uploading {key}")]
    WorkerPanic { key: String },

    /// Submitted, but no outcome ever came back.
    #[error("No outcome was recorded for {key}")]
    Lost { key: String },
}

impl UploadError {
    pub(crate) fn local_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UploadError::LocalRead {
            path: path.into(),
            source,
        }
    }

    /// Short stable name, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Credential { .. } => "credential",
            UploadError::Enumeration { .. } => "enumeration",
            UploadError::InvalidConfig { .. } => "invalid_config",
            UploadError::InvalidKey { .. } => "invalid_key",
            UploadError::LocalRead { .. } => "local_read",
            UploadError::RemoteWrite { .. } => "remote_write",
            UploadError::ExhaustedRetry { .. } => "exhausted_retry",
            UploadError::Cancelled { .. } => "cancelled",
            UploadError::WorkerPanic { .. } => "worker_panic",
            UploadError::Lost { .. } => "lost",
        }
    }

    /// Process-level errors stop the whole run; the rest are scoped to one file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            UploadError::Credential { .. }
                | UploadError::Enumeration { .. }
                | UploadError::InvalidConfig { .. }
        )
    }
}
