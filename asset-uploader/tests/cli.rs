use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::{create_dir_all, write};
use std::sync::Arc;
use tempfile::{tempdir, NamedTempFile};

use asset_uploader::cli::{upload, Cli};
use asset_uploader_core::config::{SourceRoot, UploaderConfig};
use asset_uploader_core::contract::MockBlobSink;
use asset_uploader_core::SinkError;
use clap::Parser;

/// A command with throwaway AWS credentials and no access to real config files.
fn offline_cmd() -> Command {
    let mut cmd = Command::cargo_bin("asset-uploader").expect("Binary exists");
    cmd.env("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE")
        .env("AWS_SECRET_ACCESS_KEY", "secret")
        .env("AWS_REGION", "us-east-1")
        .env("AWS_EC2_METADATA_DISABLED", "true")
        .env("AWS_CONFIG_FILE", "/nonexistent/aws/config")
        .env("AWS_SHARED_CREDENTIALS_FILE", "/nonexistent/aws/credentials");
    cmd
}

#[test]
fn help_lists_flags_and_exits_zero() {
    for flag in ["--help", "-h"] {
        offline_cmd()
            .arg(flag)
            .assert()
            .success()
            .stdout(
                predicate::str::contains("--bucket")
                    .and(predicate::str::contains("--workers"))
                    .and(predicate::str::contains("--queue")),
            );
    }
}

#[test]
fn version_prints_license_and_exits_zero() {
    for flag in ["--version", "-v"] {
        offline_cmd()
            .arg(flag)
            .assert()
            .success()
            .stdout(
                predicate::str::contains(env!("CARGO_PKG_VERSION"))
                    .and(predicate::str::contains("MIT")),
            );
    }
}

#[test]
fn zero_workers_is_rejected_before_any_work() {
    let dir = tempdir().unwrap();
    offline_cmd()
        .args(["-w", "0", "-d"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("worker count must be at least 1"));
}

#[test]
fn zero_queue_capacity_is_rejected() {
    let dir = tempdir().unwrap();
    offline_cmd()
        .args(["-q", "0", "-d"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("queue capacity must be at least 1"));
}

#[test]
fn missing_config_file_fails() {
    offline_cmd()
        .args(["-c", "/definitely/not/here.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn missing_source_directory_fails_without_uploading() {
    let dir = tempdir().unwrap();
    offline_cmd()
        .arg("-d")
        .arg(dir.path().join("no-such-dir"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot enumerate"));
}

#[test]
fn flags_parse_into_cli() {
    let cli = Cli::try_parse_from([
        "asset-uploader",
        "-b",
        "my-bucket",
        "-d",
        "./dist",
        "-k",
        "v42",
        "-w",
        "8",
        "-q",
        "16",
        "-a",
        "3",
        "--leading-slash",
        "--json",
    ])
    .expect("valid flags");
    assert_eq!(cli.bucket.as_deref(), Some("my-bucket"));
    assert_eq!(cli.directory.as_deref(), Some(std::path::Path::new("./dist")));
    assert_eq!(cli.key_prefix.as_deref(), Some("v42"));
    assert_eq!(cli.workers, Some(8));
    assert_eq!(cli.queue_capacity, Some(16));
    assert_eq!(cli.max_attempts, Some(3));
    assert!(cli.leading_slash);
    assert!(cli.json);

    assert!(Cli::try_parse_from(["asset-uploader", "-w", "many"]).is_err());
}

fn seed_site(root: &std::path::Path) {
    create_dir_all(root.join("css")).unwrap();
    write(root.join("css/site.css"), b"a{}").unwrap();
    write(root.join("broken.js"), b"x").unwrap();
}

fn site_config(root: &std::path::Path) -> UploaderConfig {
    UploaderConfig {
        bucket: "test-bucket".to_string(),
        roots: vec![SourceRoot::new(root, "v1")],
        workers: 2,
        queue_capacity: 2,
        ..UploaderConfig::default()
    }
}

#[tokio::test]
async fn upload_returns_report_when_every_file_lands() {
    let dir = tempdir().unwrap();
    seed_site(dir.path());

    let mut sink = MockBlobSink::new();
    sink.expect_put_object().times(2).returning(|_| Ok(()));

    let report = upload(&site_config(dir.path()), Arc::new(sink), true)
        .await
        .expect("clean run succeeds");
    assert!(report.is_success());
    let keys: Vec<_> = report.uploaded.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["v1/broken.js", "v1/css/site.css"]);
}

#[tokio::test]
async fn upload_fails_when_any_file_fails() {
    let dir = tempdir().unwrap();
    seed_site(dir.path());

    let mut sink = MockBlobSink::new();
    sink.expect_put_object().returning(|req| {
        if req.key == "v1/broken.js" {
            Err(SinkError::permanent("403 AccessDenied"))
        } else {
            Ok(())
        }
    });

    let err = upload(&site_config(dir.path()), Arc::new(sink), false)
        .await
        .expect_err("a failed file must fail the run");
    assert!(
        err.to_string().contains("1 of 2 uploads failed"),
        "got {err}"
    );
}

#[tokio::test]
async fn upload_surfaces_fatal_errors() {
    let dir = tempdir().unwrap();
    let config = UploaderConfig {
        bucket: "test-bucket".to_string(),
        roots: vec![SourceRoot::new(dir.path().join("missing"), "")],
        ..UploaderConfig::default()
    };
    let mut sink = MockBlobSink::new();
    sink.expect_put_object().never();

    let err = upload(&config, Arc::new(sink), false).await.unwrap_err();
    assert!(err.to_string().contains("Cannot enumerate"), "got {err}");
}

use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    // A missing config file stops the run right after start-up.
    let config = NamedTempFile::new().unwrap();
    let missing = config.path().with_extension("missing.yaml");
    let args: Vec<std::ffi::OsString> =
        vec!["asset-uploader".into(), "-c".into(), missing.into_os_string()];
    let cli = Cli::try_parse_from(args).expect("valid flags");

    let result = asset_uploader::run(cli).await;
    assert!(result.is_err());

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
