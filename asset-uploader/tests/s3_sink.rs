use std::env;

use asset_uploader::s3::S3BlobSink;
use asset_uploader_core::contract::{Acl, BlobSink, ObjectBody, ObjectMetadata, PutObjectRequest};
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use serial_test::serial;
use tempfile::tempdir;

/// Point the AWS default chain at fixed, offline values.
fn set_fake_aws_env() {
    env::set_var("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE");
    env::set_var("AWS_SECRET_ACCESS_KEY", "secret");
    env::set_var("AWS_EC2_METADATA_DISABLED", "true");
    env::set_var("AWS_CONFIG_FILE", "/nonexistent/aws/config");
    env::set_var("AWS_SHARED_CREDENTIALS_FILE", "/nonexistent/aws/credentials");
}

#[tokio::test]
#[serial]
async fn connect_succeeds_with_environment_credentials() {
    set_fake_aws_env();
    let sink = S3BlobSink::connect(Some("eu-west-1".to_string())).await;
    assert!(sink.is_ok(), "expected a sink, got {:?}", sink.err());
}

/// Nothing listens on port 1, so every request fails to dispatch.
fn unreachable_sink() -> S3BlobSink {
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .endpoint_url("http://127.0.0.1:1")
        .credentials_provider(Credentials::new("AKIDEXAMPLE", "secret", None, None, "test"))
        .force_path_style(true)
        .retry_config(RetryConfig::disabled())
        .build();
    S3BlobSink::from_client(aws_sdk_s3::Client::from_conf(config))
}

#[tokio::test]
async fn connection_failures_are_retryable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("site.css");
    std::fs::write(&path, b"a{}").unwrap();
    let file = tokio::fs::File::open(&path).await.unwrap();

    let sink = unreachable_sink();
    let req = PutObjectRequest {
        bucket: "test-bucket".to_string(),
        key: "css/site.css".to_string(),
        body: ObjectBody::new(file, 3),
        metadata: ObjectMetadata {
            content_length: 3,
            content_type: Some("text/css".to_string()),
            cache_control: "max-age=31104000".to_string(),
            acl: Acl::PublicRead,
        },
    };

    let err = sink.put_object(req).await.unwrap_err();
    assert!(err.is_retryable(), "dispatch failure should be transient: {err}");
}
