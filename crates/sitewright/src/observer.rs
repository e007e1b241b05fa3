//! Progress observation side-channel.
//!
//! Stages report human-readable log lines and structured events through a
//! [`BuildObserver`]. Observers never influence control flow; a stage with
//! no interested caller gets the no-op implementation.

use std::sync::Arc;

/// Receives progress from pipeline stages.
pub trait BuildObserver: Send + Sync {
    /// Human-readable progress line.
    fn on_log(&self, message: &str);

    /// Structured event with a machine-readable kind and payload.
    fn on_event(&self, kind: &str, payload: serde_json::Value);
}

/// Shared observer handle passed through the pipeline.
pub type SharedObserver = Arc<dyn BuildObserver>;

/// Observer that discards everything.
pub struct NoopObserver;

impl BuildObserver for NoopObserver {
    fn on_log(&self, _message: &str) {}
    fn on_event(&self, _kind: &str, _payload: serde_json::Value) {}
}

/// Observer that mirrors progress into tracing at info level.
pub struct TracingObserver;

impl BuildObserver for TracingObserver {
    fn on_log(&self, message: &str) {
        tracing::info!(target: "sitewright::progress", "{message}");
    }

    fn on_event(&self, kind: &str, payload: serde_json::Value) {
        tracing::info!(target: "sitewright::progress", kind, %payload, "event");
    }
}

/// Default no-op handle.
pub fn noop() -> SharedObserver {
    Arc::new(NoopObserver)
}
