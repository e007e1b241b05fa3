//! Fire-and-forget completion notifications.
//!
//! Delivery failure is logged and dropped; no caller ever waits on or
//! branches over a notification result.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

/// Webhook notification sink.
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    /// Post a completion message. Absent webhook config is a no-op.
    pub async fn notify_complete(&self, job_id: &str, site_url: &str, gate_passed: bool) {
        let Some(url) = &self.webhook_url else {
            debug!(job_id, "no notification webhook configured");
            return;
        };

        let body = json!({
            "text": format!(
                "build {job_id} complete: {site_url} (quality gate: {})",
                if gate_passed { "green" } else { "red" }
            ),
            "job_id": job_id,
            "site_url": site_url,
            "gate_passed": gate_passed,
        });

        match self
            .client
            .post(url)
            .timeout(Duration::from_secs(10))
            .json(&body)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!(job_id, status = %resp.status(), "notification rejected"),
            Err(e) => warn!(job_id, error = %e, "notification delivery failed"),
        }
    }
}
