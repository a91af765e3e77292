//! High-level pipeline: enumerate → queue → upload → report.
//!
//! This module drives one upload run for a loaded [`UploaderConfig`]:
//!   - Walks every configured source root (fails fast if a root is invalid)
//!   - Builds one [`UploadUnit`] per file and registers it with a
//!     [`CompletionTracker`]
//!   - Submits each unit from its own task, so a full queue only stalls that
//!     submission
//!   - Waits for the tracker to drain, stops the pool, and collects the
//!     per-unit outcomes into an [`UploadReport`]
//!
//! # Error Handling
//! Only process-level problems (invalid config, unreadable source root) are
//! returned as `Err`. Every per-file failure is recorded in
//! [`UploadReport::failed`] and never affects the other files.
//!
//! # Navigation
//! - Main entrypoint: [`upload_tree`]
//! - Supporting types: [`UploadReport`], [`FailedUpload`]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::UploaderConfig;
use crate::contract::BlobSink;
use crate::enumerate::list_files;
use crate::error::UploadError;
use crate::pool::{Job, UnitOutcome, WorkerContext, WorkerPool};
use crate::tracker::CompletionTracker;
use crate::unit::{UploadUnit, UploadedObject};

/// A file that did not make it into the bucket.
#[derive(Debug, Clone, Serialize)]
pub struct FailedUpload {
    pub path: PathBuf,
    /// `None` when no key could be derived for the path.
    pub key: Option<String>,
    pub kind: &'static str,
    pub error: String,
}

impl FailedUpload {
    fn new(path: PathBuf, key: Option<String>, error: &UploadError) -> Self {
        Self {
            path,
            key,
            kind: error.kind(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct UploadReport {
    pub uploaded: Vec<UploadedObject>,
    pub failed: Vec<FailedUpload>,
}

impl UploadReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.uploaded.len() + self.failed.len()
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.uploaded.iter().map(|o| o.bytes).sum()
    }

    /// Keys (or paths, when no key exists) of every failed file.
    pub fn failed_keys(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|f| {
                f.key
                    .clone()
                    .unwrap_or_else(|| f.path.display().to_string())
            })
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} uploaded ({} bytes), {} failed, {} total",
            self.uploaded.len(),
            self.bytes_uploaded(),
            self.failed.len(),
            self.total()
        )
    }

    /// Record a `Lost` failure for every submitted `(path, key)` that has no
    /// matching entry in the report. Returns how many were added.
    pub fn reconcile<'a>(
        &mut self,
        submitted: impl IntoIterator<Item = &'a (PathBuf, String)>,
    ) -> usize {
        let mut reported: HashMap<String, usize> = HashMap::new();
        for key in self
            .uploaded
            .iter()
            .map(|o| &o.key)
            .chain(self.failed.iter().filter_map(|f| f.key.as_ref()))
        {
            *reported.entry(key.clone()).or_default() += 1;
        }

        let mut lost = Vec::new();
        for (path, key) in submitted {
            match reported.get_mut(key) {
                Some(count) if *count > 0 => *count -= 1,
                _ => {
                    let error = UploadError::Lost { key: key.clone() };
                    lost.push(FailedUpload::new(path.clone(), Some(key.clone()), &error));
                }
            }
        }
        let added = lost.len();
        self.failed.extend(lost);
        added
    }

    fn record(&mut self, outcome: UnitOutcome) {
        match outcome.result {
            Ok(obj) => self.uploaded.push(obj),
            Err(e) => self
                .failed
                .push(FailedUpload::new(outcome.path, Some(outcome.key), &e)),
        }
    }

    fn sort(&mut self) {
        self.uploaded.sort_by(|a, b| a.key.cmp(&b.key));
        self.failed.sort_by(|a, b| a.path.cmp(&b.path));
    }
}

/// Upload every file under the configured roots and report the result.
///
/// Returns once every submitted file has reached a terminal state. Cancelling
/// `cancel` makes the remaining files finish as cancelled instead of being
/// uploaded; the call still returns a complete report.
pub async fn upload_tree(
    config: &UploaderConfig,
    sink: Arc<dyn BlobSink>,
    cancel: CancellationToken,
) -> Result<UploadReport, UploadError> {
    config.validate()?;
    info!(bucket = %config.bucket, "[DISPATCH] Starting upload run");

    // Walk everything up front: a bad root must abort before any upload.
    let mut planned = Vec::with_capacity(config.roots.len());
    for root in &config.roots {
        let files = list_files(&root.dir).map_err(|e| {
            error!(root = %root.dir.display(), error = %e, "[DISPATCH][ERROR] Enumeration failed");
            e
        })?;
        info!(root = %root.dir.display(), files = files.len(), "[DISPATCH] Enumerated source root");
        planned.push((root, files));
    }

    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let pool = WorkerPool::start(
        config.workers,
        config.queue_capacity,
        WorkerContext {
            sink,
            policy: config.retry,
            outcomes: outcome_tx.clone(),
            cancel: cancel.clone(),
        },
    )?;
    let tracker = CompletionTracker::new();
    let queue = pool.queue();
    let mut report = UploadReport::default();
    let mut submitted = Vec::new();

    for (root, files) in planned {
        for path in files {
            let unit = match UploadUnit::new(path.clone(), root, config) {
                Ok(unit) => unit,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "[DISPATCH] Skipping file");
                    report.failed.push(FailedUpload::new(path, None, &e));
                    continue;
                }
            };

            submitted.push((path, unit.relative_key().to_string()));
            let job = Job::new(unit, &tracker);

            let queue = queue.clone();
            let outcomes = outcome_tx.clone();
            tokio::spawn(async move {
                if let Err(job) = queue.submit(job).await {
                    let key = job.unit().relative_key().to_string();
                    debug!(key = %key, "[DISPATCH] Queue closed before submission");
                    job.finish(Err(UploadError::Cancelled { key }), &outcomes);
                }
            });
        }
    }
    drop(queue);
    drop(outcome_tx);

    info!(
        submitted = submitted.len(),
        "[DISPATCH] All files submitted, waiting for uploads to finish"
    );
    tracker.wait().await;
    pool.shutdown().await;

    // Every sender is gone once the pool and the submission tasks are done.
    while let Some(outcome) = outcome_rx.recv().await {
        report.record(outcome);
    }

    let lost = report.reconcile(&submitted);
    if lost > 0 {
        error!(
            submitted = submitted.len(),
            lost,
            "[DISPATCH][ERROR] Some submitted files never reported an outcome"
        );
    }
    report.sort();

    info!(
        uploaded = report.uploaded.len(),
        failed = report.failed.len(),
        bytes = report.bytes_uploaded(),
        "[DISPATCH] Upload run complete"
    );
    match serde_json::to_string(&report) {
        Ok(json) => debug!(json = %json, "[DISPATCH][DEBUG] Report as JSON"),
        Err(e) => debug!(error = ?e, "[DISPATCH][DEBUG] Failed to serialize report"),
    }

    Ok(report)
}
