#![doc = "S3 blob sink: bridges the core `BlobSink` contract to `aws-sdk-s3`."]
//
//! # S3 integration (CLI <-> Core)
//!
//! This module provides the [`S3BlobSink`] used by the CLI for real uploads.
//! It wires [`asset_uploader_core::contract::BlobSink`] to a single
//! `PutObject` call per attempt and classifies SDK failures so the core retry
//! policy knows which ones are worth repeating.
//!
//! ## Client Usage
//!
//! - Construct with [`S3BlobSink::connect`]. Credentials come from the
//!   standard AWS chain (environment, profile, instance metadata).
//! - Bodies are streamed from the open file handle, never buffered whole.
//! - Credentials are resolved eagerly, so a missing or broken setup fails at
//!   startup with [`UploadError::Credential`] instead of on the first upload.

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;

use asset_uploader_core::contract::{Acl, BlobSink, PutObjectRequest};
use asset_uploader_core::{SinkError, UploadError};

pub const DEFAULT_REGION: &str = "us-east-1";

pub struct S3BlobSink {
    client: Client,
}

impl S3BlobSink {
    /// Build a client from the ambient AWS configuration and check that
    /// credentials can actually be resolved.
    pub async fn connect(region: Option<String>) -> Result<Self, UploadError> {
        let region_provider = RegionProviderChain::first_try(region.map(Region::new))
            .or_default_provider()
            .or_else(Region::new(DEFAULT_REGION));
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            // Attempts are counted by the core retry policy, not the SDK.
            .retry_config(RetryConfig::disabled())
            .load()
            .await;

        let provider = sdk_config.credentials_provider().ok_or_else(|| {
            tracing::error!("No AWS credentials provider configured");
            UploadError::Credential {
                message: "no credentials provider configured".to_string(),
            }
        })?;
        provider.provide_credentials().await.map_err(|e| {
            tracing::error!(error = %DisplayErrorContext(&e), "Failed to resolve AWS credentials");
            UploadError::Credential {
                message: DisplayErrorContext(&e).to_string(),
            }
        })?;

        tracing::info!(region = ?sdk_config.region(), "Initialized S3 client from environment");
        Ok(Self {
            client: Client::new(&sdk_config),
        })
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobSink for S3BlobSink {
    async fn put_object(&self, req: PutObjectRequest) -> Result<(), SinkError> {
        let PutObjectRequest {
            bucket,
            key,
            body,
            metadata,
        } = req;

        let (file, len) = body.into_parts();
        let stream = ByteStream::read_from()
            .file(file)
            .length(Length::Exact(len))
            .build()
            .await
            .map_err(|e| {
                tracing::error!(key = %key, error = %DisplayErrorContext(&e), "Cannot stream object body");
                SinkError::permanent(format!("cannot stream body for {key}: {e}"))
            })?;

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(stream)
            .content_length(metadata.content_length as i64)
            .cache_control(metadata.cache_control)
            .acl(canned_acl(metadata.acl));
        if let Some(content_type) = metadata.content_type {
            request = request.content_type(content_type);
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                let classified = classify(err);
                tracing::debug!(
                    key = %key,
                    retryable = classified.retryable,
                    error = %classified,
                    "PutObject failed"
                );
                Err(classified)
            }
        }
    }
}

fn canned_acl(acl: Acl) -> ObjectCannedAcl {
    match acl {
        Acl::Private => ObjectCannedAcl::Private,
        Acl::PublicRead => ObjectCannedAcl::PublicRead,
    }
}

/// Server errors, timeouts and throttling are worth retrying; other 4xx are not.
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

fn classify(err: SdkError<PutObjectError>) -> SinkError {
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ConstructionFailure(_) => SinkError::permanent(message),
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            SinkError::transient(message)
        }
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            if is_retryable_status(status) {
                SinkError::transient(message)
            } else {
                SinkError::permanent(message)
            }
        }
        _ => SinkError::transient(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(408));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(403));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn acl_mapping() {
        assert_eq!(canned_acl(Acl::PublicRead), ObjectCannedAcl::PublicRead);
        assert_eq!(canned_acl(Acl::Private), ObjectCannedAcl::Private);
    }
}
