//! Persistence boundary.
//!
//! The pipeline reports job status, phase transitions, and final artifacts
//! to a [`SessionStore`]. The store owns whatever schema sits behind it;
//! the core only ever creates or updates a record by identifier.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::model::{BuildJob, PageArtifact};

/// External persistence for build records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create or replace the record for a job.
    async fn upsert_job(&self, job: &BuildJob);

    /// Append a log line to the job's record.
    async fn append_log(&self, job_id: &str, line: &str);

    /// Record the final artifact set for a job.
    async fn record_artifacts(&self, job_id: &str, artifacts: &[PageArtifact]);
}

/// Store that keeps nothing.
pub struct NoopSessionStore;

#[async_trait]
impl SessionStore for NoopSessionStore {
    async fn upsert_job(&self, _job: &BuildJob) {}
    async fn append_log(&self, _job_id: &str, _line: &str) {}
    async fn record_artifacts(&self, _job_id: &str, _artifacts: &[PageArtifact]) {}
}

/// In-memory store used by tests and the CLI's single-run mode.
#[derive(Default)]
pub struct MemorySessionStore {
    jobs: Mutex<HashMap<String, BuildJob>>,
    logs: Mutex<HashMap<String, Vec<String>>>,
    artifacts: Mutex<HashMap<String, Vec<PageArtifact>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(&self, id: &str) -> Option<BuildJob> {
        self.jobs.lock().unwrap().get(id).cloned()
    }

    pub fn logs(&self, id: &str) -> Vec<String> {
        self.logs.lock().unwrap().get(id).cloned().unwrap_or_default()
    }

    pub fn artifacts(&self, id: &str) -> Vec<PageArtifact> {
        self.artifacts
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn upsert_job(&self, job: &BuildJob) {
        self.jobs
            .lock()
            .unwrap()
            .insert(job.id.clone(), job.clone());
    }

    async fn append_log(&self, job_id: &str, line: &str) {
        self.logs
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push(line.to_string());
    }

    async fn record_artifacts(&self, job_id: &str, artifacts: &[PageArtifact]) {
        self.artifacts
            .lock()
            .unwrap()
            .insert(job_id.to_string(), artifacts.to_vec());
    }
}
