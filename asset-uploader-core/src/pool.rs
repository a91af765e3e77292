//! Bounded work queue and the worker pool that drains it.
//!
//! The queue is an `async_channel::bounded` channel: senders wait while it is
//! full, and every job is received by exactly one worker. Each worker runs one
//! job at a time, retries included, before taking the next.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::contract::BlobSink;
use crate::error::UploadError;
use crate::retry::RetryPolicy;
use crate::tracker::{CompletionGuard, CompletionTracker};
use crate::unit::{UploadUnit, UploadedObject};

/// A unit queued for upload, holding its place in the completion count.
#[derive(Debug)]
pub struct Job {
    unit: UploadUnit,
    completion: CompletionGuard,
}

impl Job {
    /// Register `unit` with `tracker`. The registration is released when the
    /// job is dropped, whether or not it was ever executed.
    pub fn new(unit: UploadUnit, tracker: &CompletionTracker) -> Self {
        Self {
            unit,
            completion: tracker.register(),
        }
    }

    pub fn unit(&self) -> &UploadUnit {
        &self.unit
    }

    /// Resolve the job: report its outcome, then release the tracker.
    pub fn finish(
        self,
        result: Result<UploadedObject, UploadError>,
        outcomes: &mpsc::UnboundedSender<UnitOutcome>,
    ) {
        let outcome = UnitOutcome {
            path: self.unit.local_path().to_path_buf(),
            key: self.unit.relative_key().to_string(),
            result,
        };
        if outcomes.send(outcome).is_err() {
            debug!(key = %self.unit.relative_key(), "Outcome receiver dropped");
        }
        self.completion.complete();
    }
}

/// Terminal result of one unit.
#[derive(Debug)]
pub struct UnitOutcome {
    pub path: PathBuf,
    pub key: String,
    pub result: Result<UploadedObject, UploadError>,
}

/// Producer handle for the bounded queue.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: async_channel::Sender<Job>,
}

impl WorkQueue {
    /// Enqueue a job, waiting while the queue is full.
    ///
    /// Gives the job back if the queue has been closed.
    pub async fn submit(&self, job: Job) -> Result<(), Job> {
        self.tx.send(job).await.map_err(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Everything a worker needs, shared by all workers in the pool.
#[derive(Clone)]
pub struct WorkerContext {
    pub sink: Arc<dyn BlobSink>,
    pub policy: RetryPolicy,
    pub outcomes: mpsc::UnboundedSender<UnitOutcome>,
    pub cancel: CancellationToken,
}

pub struct WorkerPool {
    queue: WorkQueue,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks on the current runtime, reading from a queue of
    /// `capacity` slots. Both must be at least 1.
    pub fn start(workers: usize, capacity: usize, ctx: WorkerContext) -> Result<Self, UploadError> {
        if workers == 0 || capacity == 0 {
            return Err(UploadError::InvalidConfig {
                message: format!(
                    "worker pool needs at least one worker and one queue slot (workers={workers}, capacity={capacity})"
                ),
            });
        }

        let (tx, rx) = async_channel::bounded(capacity);
        let handles = (0..workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    rx: rx.clone(),
                    ctx: ctx.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();
        info!(workers, capacity, "[POOL] Worker pool started");

        Ok(Self {
            queue: WorkQueue { tx },
            handles,
        })
    }

    pub fn queue(&self) -> WorkQueue {
        self.queue.clone()
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Close the queue and wait for every worker to exit.
    ///
    /// Jobs already queued are still processed before the workers stop.
    pub async fn shutdown(self) {
        self.queue.tx.close();
        for (id, res) in join_all(self.handles).await.into_iter().enumerate() {
            if let Err(e) = res {
                error!(worker = id, error = ?e, "[POOL] Worker task failed");
            }
        }
        info!("[POOL] Worker pool stopped");
    }
}

struct Worker {
    id: usize,
    rx: async_channel::Receiver<Job>,
    ctx: WorkerContext,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "[POOL] Worker waiting for jobs");
        // recv fails only once the queue is closed and empty.
        while let Ok(job) = self.rx.recv().await {
            let key = job.unit().relative_key().to_string();

            let result = if self.ctx.cancel.is_cancelled() {
                Err(UploadError::Cancelled { key })
            } else {
                AssertUnwindSafe(job.unit().execute(
                    self.ctx.sink.as_ref(),
                    &self.ctx.policy,
                    &self.ctx.cancel,
                ))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!(worker = self.id, key = %key, "[POOL] Upload panicked");
                    Err(UploadError::WorkerPanic { key })
                })
            };

            job.finish(result, &self.ctx.outcomes);
        }
        debug!(worker = self.id, "[POOL] Queue closed, worker exiting");
    }
}
