//! Build queue — FIFO front door to the pipeline.
//!
//! Jobs start strictly in enqueue order; a semaphore bounds how many run
//! at once (default one lane). The worker task starts lazily on first
//! enqueue and stops once the pending list empties; a later enqueue
//! restarts it. The permit count is the real point: it caps how many jobs
//! hold a working directory and hit rate-limited APIs simultaneously.
//!
//! A per-job failure is recorded on the job and never stops the worker.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, Semaphore};
use tracing::{error, info, warn};

use crate::model::{BuildJob, JobStatus};
use crate::session::SessionStore;

/// Runs one job to completion. The pipeline is the production executor;
/// tests substitute their own.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &mut BuildJob) -> anyhow::Result<()>;
}

struct QueueState {
    pending: VecDeque<BuildJob>,
    /// Ids currently queued or running; duplicate enqueues bounce off this.
    active_ids: HashSet<String>,
    worker_running: bool,
}

struct QueueInner {
    executor: Arc<dyn JobExecutor>,
    store: Arc<dyn SessionStore>,
    state: Mutex<QueueState>,
    permits: Arc<Semaphore>,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// FIFO scheduler with bounded concurrency.
#[derive(Clone)]
pub struct BuildQueue {
    inner: Arc<QueueInner>,
}

impl BuildQueue {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        store: Arc<dyn SessionStore>,
        lanes: usize,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                executor,
                store,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    active_ids: HashSet::new(),
                    worker_running: false,
                }),
                permits: Arc::new(Semaphore::new(lanes.max(1))),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Add a job to the back of the queue, starting the worker if needed.
    ///
    /// Returns `false` without touching anything when the job's id is
    /// already queued or running.
    pub fn enqueue(&self, job: BuildJob) -> bool {
        let spawn_worker = {
            let mut state = self.inner.state.lock().unwrap();
            if !state.active_ids.insert(job.id.clone()) {
                warn!(job = %job.id, "duplicate enqueue rejected");
                return false;
            }
            info!(job = %job.id, position = state.pending.len(), "job enqueued");
            state.pending.push_back(job);
            if state.worker_running {
                false
            } else {
                state.worker_running = true;
                true
            }
        };

        if spawn_worker {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(worker_loop(inner));
        }
        true
    }

    /// Remove a not-yet-started job, marking it cancelled in the store.
    /// Jobs already running are unaffected; there is no mid-stage cancel.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let cancelled = {
            let mut state = self.inner.state.lock().unwrap();
            match state.pending.iter().position(|j| j.id == job_id) {
                Some(idx) => {
                    let mut job = state.pending.remove(idx).expect("index just found");
                    state.active_ids.remove(job_id);
                    job.status = JobStatus::Cancelled;
                    job.finished_at = Some(Utc::now());
                    Some(job)
                }
                None => None,
            }
        };
        match cancelled {
            Some(job) => {
                self.inner.store.upsert_job(&job).await;
                info!(job = %job.id, "job cancelled before start");
                true
            }
            None => false,
        }
    }

    /// Number of jobs waiting to start.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().unwrap().pending.len()
    }

    /// Whether the worker is live or any job is still executing.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().unwrap().worker_running
            || self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Wait until the queue is empty and every started job has finished.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.is_running() && self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// The worker: pop in FIFO order, acquire a permit, hand the job to a
/// task. Permit acquisition happens here, sequentially, so start order is
/// exactly enqueue order even with multiple lanes.
async fn worker_loop(inner: Arc<QueueInner>) {
    loop {
        // Hold off dequeuing until a lane is free: a job stays visible in
        // the pending list (and cancellable) until it actually starts.
        let permit = match Arc::clone(&inner.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // Semaphore closed only at teardown.
                inner.state.lock().unwrap().worker_running = false;
                inner.idle.notify_waiters();
                return;
            }
        };

        let job = {
            let mut state = inner.state.lock().unwrap();
            match state.pending.pop_front() {
                Some(job) => Some(job),
                None => {
                    state.worker_running = false;
                    None
                }
            }
        };
        let Some(job) = job else {
            drop(permit);
            inner.idle.notify_waiters();
            return;
        };

        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let task_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            run_one(&task_inner, job).await;
            drop(permit);
            task_inner.in_flight.fetch_sub(1, Ordering::SeqCst);
            task_inner.idle.notify_waiters();
        });
    }
}

async fn run_one(inner: &QueueInner, mut job: BuildJob) {
    let id = job.id.clone();
    info!(job = %id, "job starting");

    match inner.executor.execute(&mut job).await {
        Ok(()) => {
            info!(job = %id, status = %job.status, "job finished");
        }
        Err(e) => {
            error!(job = %id, error = %e, "job failed");
            job.status = JobStatus::Failed;
            job.error = Some(e.to_string());
            job.finished_at = Some(Utc::now());
            inner.store.upsert_job(&job).await;
        }
    }

    inner.state.lock().unwrap().active_ids.remove(&id);
}
