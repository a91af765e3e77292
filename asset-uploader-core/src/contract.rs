//! # contract: the object-store write boundary
//!
//! This module defines the single trait ([`BlobSink`]) that the upload
//! pipeline writes through, plus the plain request types passed across it.
//!
//! ## Interface & Extensibility
//! - Implement [`BlobSink`] to add a destination (S3 in the CLI crate, an
//!   in-memory or scripted sink in tests).
//! - `put_object` is async and returns a classified [`SinkError`]: the
//!   implementor decides whether a failure is worth retrying.
//! - The pipeline owns retries. A sink should make exactly one attempt per
//!   call.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall` so tests can script per-attempt
//!   behaviour (fail N times, then succeed).

use std::fmt;

use async_trait::async_trait;
use tokio::fs::File;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::SinkError;

/// Canned access policy applied to every written object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
    Private,
    PublicRead,
}

impl Acl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
        }
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Headers sent with each object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_length: u64,
    /// `None` when the extension has no known MIME type.
    pub content_type: Option<String>,
    pub cache_control: String,
    pub acl: Acl,
}

/// Streamed object body: a file handle positioned at the first byte, and the
/// number of bytes to read from it.
///
/// The handle shares its cursor with the one the pipeline keeps, so the next
/// attempt rewinds it before building a new body.
#[derive(Debug)]
pub struct ObjectBody {
    file: File,
    len: u64,
}

impl ObjectBody {
    pub fn new(file: File, len: u64) -> Self {
        Self { file, len }
    }

    pub fn into_parts(self) -> (File, u64) {
        (self.file, self.len)
    }
}

/// One object write: destination, body and metadata.
#[derive(Debug)]
pub struct PutObjectRequest {
    pub bucket: String,
    /// Object key, relative to the bucket root.
    pub key: String,
    pub body: ObjectBody,
    pub metadata: ObjectMetadata,
}

/// Write capability of an object store.
///
/// The trait is `Send + Sync` because one sink is shared by all workers.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BlobSink: Send + Sync {
    /// Write one object. A single attempt; the caller handles retries.
    async fn put_object(&self, req: PutObjectRequest) -> Result<(), SinkError>;
}
