//! A single file-to-object upload.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncSeekExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{KeyStyle, SourceRoot, UploaderConfig};
use crate::contract::{Acl, BlobSink, ObjectBody, ObjectMetadata, PutObjectRequest};
use crate::error::UploadError;
use crate::retry::{RetryDecision, RetryPolicy};

/// A successfully written object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedObject {
    pub key: String,
    pub attempts: u32,
    pub bytes: u64,
}

/// One file and everything needed to put it in the bucket.
///
/// The remote key is derived once at construction, so an unmappable path is
/// rejected before the unit is ever queued.
#[derive(Debug, Clone)]
pub struct UploadUnit {
    local_path: PathBuf,
    bucket: String,
    key: String,
    cache_control: String,
    acl: Acl,
}

impl UploadUnit {
    pub fn new(
        local_path: impl Into<PathBuf>,
        root: &SourceRoot,
        config: &UploaderConfig,
    ) -> Result<Self, UploadError> {
        let local_path = local_path.into();
        let key = derive_key(&local_path, &root.dir, &root.key_prefix, config.key_style)?;
        Ok(Self {
            local_path,
            bucket: config.bucket.clone(),
            key,
            cache_control: config.cache_control.clone(),
            acl: config.acl,
        })
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The object key this file is written to.
    pub fn relative_key(&self) -> &str {
        &self.key
    }

    /// MIME type guessed from the extension, `None` if unknown.
    pub fn content_type(&self) -> Option<&'static str> {
        mime_guess::from_path(&self.local_path).first_raw()
    }

    /// Upload the file, retrying per `policy`.
    ///
    /// Each attempt rewinds the file and streams the whole body again.
    pub async fn execute(
        &self,
        sink: &dyn BlobSink,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<UploadedObject, UploadError> {
        let mut file = File::open(&self.local_path)
            .await
            .map_err(|e| UploadError::local_read(&self.local_path, e))?;

        let mut attempt: u32 = 1;
        loop {
            info!(attempt, key = %self.key, "[UPLOAD] Path");
            let req = self.prepare_request(&mut file).await?;
            let bytes = req.metadata.content_length;

            let err = match sink.put_object(req).await {
                Ok(()) => {
                    debug!(key = %self.key, attempt, bytes, "[UPLOAD] Object written");
                    return Ok(UploadedObject {
                        key: self.key.clone(),
                        attempts: attempt,
                        bytes,
                    });
                }
                Err(err) => err,
            };

            match policy.decide(attempt, &err) {
                RetryDecision::GiveUp => {
                    warn!(key = %self.key, attempt, error = %err, "[UPLOAD] Permanent failure, not retrying");
                    return Err(UploadError::RemoteWrite {
                        key: self.key.clone(),
                        source: err,
                    });
                }
                RetryDecision::Exhausted => {
                    warn!(key = %self.key, attempt, error = %err, "[UPLOAD] Giving up, retries exhausted");
                    return Err(UploadError::ExhaustedRetry {
                        key: self.key.clone(),
                        attempts: attempt,
                        last_error: err,
                    });
                }
                RetryDecision::Retry(delay) => {
                    warn!(
                        key = %self.key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "[UPLOAD] Attempt failed, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(UploadError::Cancelled { key: self.key.clone() });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Rewind and stat the file, then hand a clone of the handle to a fresh
    /// request.
    async fn prepare_request(&self, file: &mut File) -> Result<PutObjectRequest, UploadError> {
        let read_err = |e| UploadError::local_read(&self.local_path, e);

        file.seek(SeekFrom::Start(0)).await.map_err(read_err)?;
        let size = file.metadata().await.map_err(read_err)?.len();
        let handle = file.try_clone().await.map_err(read_err)?;

        let metadata = ObjectMetadata {
            content_length: size,
            content_type: self.content_type().map(str::to_owned),
            cache_control: self.cache_control.clone(),
            acl: self.acl,
        };
        Ok(PutObjectRequest {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            body: ObjectBody::new(handle, size),
            metadata,
        })
    }
}

/// Map `local_path` under `base_dir` to an object key.
///
/// Exactly one `base_dir` prefix is removed. Separators are always `/`.
pub fn derive_key(
    local_path: &Path,
    base_dir: &Path,
    key_prefix: &str,
    style: KeyStyle,
) -> Result<String, UploadError> {
    let invalid = |message: &str| UploadError::InvalidKey {
        path: local_path.to_path_buf(),
        message: message.to_string(),
    };

    let relative = local_path
        .strip_prefix(base_dir)
        .map_err(|_| invalid("path is not inside the source directory"))?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => segments.push(part),
                None => return Err(invalid("file name is not valid UTF-8")),
            },
            Component::CurDir => {}
            _ => return Err(invalid("path escapes the source directory")),
        }
    }
    if segments.is_empty() {
        return Err(invalid("path is the source directory itself"));
    }

    let prefix = key_prefix.trim_matches('/');
    let mut parts = Vec::new();
    if !prefix.is_empty() {
        for part in prefix.split('/') {
            match part {
                ".." => return Err(invalid("key prefix escapes the bucket namespace")),
                "" | "." => return Err(invalid("key prefix has an empty or `.` segment")),
                _ => parts.push(part),
            }
        }
    }
    parts.extend(segments);
    let key = parts.join("/");

    Ok(match style {
        KeyStyle::Plain => key,
        KeyStyle::LeadingSlash => format!("/{key}"),
    })
}
