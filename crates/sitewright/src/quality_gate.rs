//! Quality gate — bounded-attempt verify→repair convergence.
//!
//! Runs the external verification runner over the materialized pages and,
//! on failure, asks the model to repair each implicated page's main
//! content. Splicing keeps everything outside `<main>` untouched: head,
//! nav active states, footer, and injected scripts survive repair. A
//! failed repair on one page never aborts the loop; only the attempt
//! budget bounds cost. A red final outcome is reported, not fatal.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::extract;
use crate::gateway::{AiGateway, ChatMessage};
use crate::model::{PageArtifact, TestOutcome};
use crate::observer::SharedObserver;
use crate::prompts;

/// Most failure descriptions fed into one repair prompt.
const MAX_FAILURES_PER_REPAIR: usize = 15;

/// Black-box test runner over a directory of generated pages.
#[async_trait]
pub trait VerificationRunner: Send + Sync {
    async fn verify(
        &self,
        site_dir: &Path,
        manifest: &[PageArtifact],
        attempt: u32,
    ) -> anyhow::Result<TestOutcome>;
}

/// Final report of the gate, recorded on the job either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    pub passed: bool,
    pub attempts: u32,
    pub failures: Vec<String>,
}

/// Drive verification and repair until green or the attempt budget is out.
pub async fn run_quality_gate(
    runner: &dyn VerificationRunner,
    gateway: &AiGateway,
    pages: &mut [PageArtifact],
    site_dir: &Path,
    max_attempts: u32,
    observer: &SharedObserver,
) -> GateReport {
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let outcome = match runner.verify(site_dir, pages, attempt).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(attempt, error = %e, "verification runner errored");
                TestOutcome {
                    passed: false,
                    failures: vec![format!("verification runner error: {e}")],
                    implicated_slugs: None,
                    attempt,
                }
            }
        };

        observer.on_event(
            "gate_attempt",
            json!({
                "attempt": attempt,
                "passed": outcome.passed,
                "failures": outcome.failures.len(),
            }),
        );

        if outcome.passed {
            info!(attempt, "quality gate green");
            return GateReport {
                passed: true,
                attempts: attempt,
                failures: Vec::new(),
            };
        }

        if attempt == max_attempts {
            warn!(
                attempt,
                failures = outcome.failures.len(),
                "quality gate never converged, shipping best effort"
            );
            return GateReport {
                passed: false,
                attempts: attempt,
                failures: outcome.failures,
            };
        }

        let implicated: Vec<String> = match &outcome.implicated_slugs {
            Some(slugs) if !slugs.is_empty() => slugs.clone(),
            _ => pages.iter().map(|p| p.slug.clone()).collect(),
        };
        info!(
            attempt,
            pages = implicated.len(),
            "attempting repair on implicated pages"
        );

        for slug in &implicated {
            let Some(page) = pages.iter_mut().find(|p| p.slug == *slug) else {
                continue;
            };
            match repair_page(gateway, page, &outcome.failures).await {
                Some(repaired) => {
                    page.html = repaired;
                    page.bytes = page.html.len();
                    if let Err(e) =
                        tokio::fs::write(site_dir.join(&page.filename), &page.html).await
                    {
                        warn!(slug, error = %e, "failed to write repaired page");
                    } else {
                        observer.on_log(&format!("repaired {slug} (attempt {attempt})"));
                    }
                }
                None => {
                    // Leave the page as it was; other pages still get their shot.
                    warn!(slug, attempt, "repair produced no usable fragment");
                }
            }
        }
    }

    // Loop always returns from inside; max_attempts >= 1 guarantees entry.
    unreachable!("quality gate loop exited without a report")
}

/// Ask the model for a corrected `<main>` fragment and splice it in.
/// Returns `None` when the page has no main region or the model's output
/// is unusable.
async fn repair_page(
    gateway: &AiGateway,
    page: &PageArtifact,
    failures: &[String],
) -> Option<String> {
    let (main_start, main_end) = find_main_region(&page.html)?;
    let fragment = &page.html[main_start..main_end];

    let failure_list: String = failures
        .iter()
        .take(MAX_FAILURES_PER_REPAIR)
        .map(|f| format!("- {f}\n"))
        .collect();
    let prompt = format!(
        "Page: {}\n\nFailures:\n{failure_list}\nCurrent <main> content:\n{fragment}",
        page.filename
    );

    let raw = match gateway
        .generate(
            &[
                ChatMessage::system(prompts::REPAIR_PREAMBLE),
                ChatMessage::user(prompt),
            ],
            0.3,
            8192,
            None,
        )
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(slug = %page.slug, error = %e, "repair call failed");
            return None;
        }
    };

    let repaired = extract::extract_html(&raw).ok()?;
    let lower = repaired.to_lowercase();
    if !lower.contains("<main") || !lower.contains("</main>") {
        return None;
    }
    // A full document in response to a fragment request is rejected rather
    // than spliced; it would duplicate head/nav/footer.
    if lower.contains("<!doctype") || lower.contains("<html") {
        return None;
    }

    Some(splice_main(&page.html, main_start, main_end, repaired.trim()))
}

/// Deterministic built-in checks over the materialized pages.
///
/// No model involvement: file presence, document structure, leftover
/// generation debris. Failures are attributed to slugs so repair can
/// target only the broken pages.
pub struct StaticVerifier;

#[async_trait]
impl VerificationRunner for StaticVerifier {
    async fn verify(
        &self,
        site_dir: &Path,
        manifest: &[PageArtifact],
        attempt: u32,
    ) -> anyhow::Result<TestOutcome> {
        let mut failures = Vec::new();
        let mut implicated = Vec::new();

        if !site_dir.join("index.html").is_file() {
            failures.push("index.html is missing from the site root".to_string());
        }

        for page in manifest {
            let path = site_dir.join(&page.filename);
            let html = match tokio::fs::read_to_string(&path).await {
                Ok(html) => html,
                Err(e) => {
                    failures.push(format!("{}: unreadable ({e})", page.filename));
                    implicated.push(page.slug.clone());
                    continue;
                }
            };
            let lower = html.to_ascii_lowercase();
            let mut broken = false;
            if !lower.contains("<!doctype") {
                failures.push(format!("{}: missing doctype", page.filename));
                broken = true;
            }
            if !lower.contains("<title") {
                failures.push(format!("{}: missing <title>", page.filename));
                broken = true;
            }
            if !lower.contains("<main") {
                failures.push(format!("{}: missing <main> landmark", page.filename));
                broken = true;
            }
            if !lower.contains("<nav") {
                failures.push(format!("{}: missing navigation", page.filename));
                broken = true;
            }
            if lower.contains("lorem ipsum") {
                failures.push(format!("{}: placeholder copy left in page", page.filename));
                broken = true;
            }
            if html.contains("```") {
                failures.push(format!("{}: markdown fence left in page", page.filename));
                broken = true;
            }
            if broken {
                implicated.push(page.slug.clone());
            }
        }

        Ok(TestOutcome {
            passed: failures.is_empty(),
            failures,
            implicated_slugs: if implicated.is_empty() {
                None
            } else {
                Some(implicated)
            },
            attempt,
        })
    }
}

/// Runner that shells out to an external test command.
///
/// The command gets the site directory as its argument and reports back as
/// JSON on stdout
/// (`{"passed": bool, "failures": [..], "implicated_slugs": [..]}`).
/// A non-JSON or crashing runner is an error the gate folds into a
/// failing outcome.
pub struct CommandVerifier {
    program: String,
}

impl CommandVerifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl VerificationRunner for CommandVerifier {
    async fn verify(
        &self,
        site_dir: &Path,
        _manifest: &[PageArtifact],
        attempt: u32,
    ) -> anyhow::Result<TestOutcome> {
        let output = tokio::process::Command::new(&self.program)
            .arg(site_dir)
            .output()
            .await?;
        if !output.status.success() && output.stdout.is_empty() {
            anyhow::bail!(
                "verifier {} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let mut outcome: TestOutcome = serde_json::from_slice(&output.stdout)?;
        outcome.attempt = attempt;
        Ok(outcome)
    }
}

/// Byte range of the `<main ...>...</main>` region, tags included.
fn find_main_region(html: &str) -> Option<(usize, usize)> {
    let lower = html.to_ascii_lowercase();
    let start = lower.find("<main")?;
    let close = lower[start..].find("</main>")? + start;
    Some((start, close + "</main>".len()))
}

fn splice_main(html: &str, start: usize, end: usize, fragment: &str) -> String {
    let mut out = String::with_capacity(html.len() + fragment.len());
    out.push_str(&html[..start]);
    out.push_str(fragment);
    out.push_str(&html[end..]);
    out
}
