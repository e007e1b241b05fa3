//! Quality-gate convergence behavior with scripted runners and repairs.

mod common;

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{ScriptedProvider, SharedProvider};
use sitewright::gateway::AiGateway;
use sitewright::model::{ArtifactStatus, PageArtifact, TestOutcome};
use sitewright::observer;
use sitewright::quality_gate::{run_quality_gate, VerificationRunner};

const PAGE_HTML: &str = "<!DOCTYPE html><html><head><title>Home</title></head><body>\
<nav><a href=\"index.html\" aria-current=\"page\">Home</a></nav>\
<main><h1>Welcome</h1><p>Old copy.</p></main>\
<footer>©</footer><script id=\"sw-scroll-reveal\">x()</script></body></html>";

fn page(slug: &str, filename: &str) -> PageArtifact {
    PageArtifact {
        slug: slug.into(),
        filename: filename.into(),
        status: ArtifactStatus::Generated,
        bytes: PAGE_HTML.len(),
        html: PAGE_HTML.into(),
    }
}

/// Runner that fails until a configured attempt, attributing failures to
/// the given slugs.
struct ScriptedRunner {
    pass_on_attempt: u32,
    implicate: Option<Vec<String>>,
    verify_calls: AtomicU32,
}

impl ScriptedRunner {
    fn failing_forever(implicate: Option<Vec<String>>) -> Self {
        Self {
            pass_on_attempt: u32::MAX,
            implicate,
            verify_calls: AtomicU32::new(0),
        }
    }

    fn passing_on(attempt: u32, implicate: Option<Vec<String>>) -> Self {
        Self {
            pass_on_attempt: attempt,
            implicate,
            verify_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl VerificationRunner for ScriptedRunner {
    async fn verify(
        &self,
        _site_dir: &Path,
        _manifest: &[PageArtifact],
        attempt: u32,
    ) -> anyhow::Result<TestOutcome> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let passed = attempt >= self.pass_on_attempt;
        Ok(TestOutcome {
            passed,
            failures: if passed {
                Vec::new()
            } else {
                vec!["home: headline does not mention the business".into()]
            },
            implicated_slugs: self.implicate.clone(),
            attempt,
        })
    }
}

fn gateway_with(provider: &Arc<ScriptedProvider>) -> AiGateway {
    AiGateway::with_provider(Box::new(SharedProvider(provider.clone())), 0)
}

#[tokio::test]
async fn green_first_try_makes_no_repair_calls() {
    let runner = ScriptedRunner::passing_on(1, None);
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let gateway = gateway_with(&provider);
    let dir = tempfile::tempdir().unwrap();
    let mut pages = vec![page("home", "index.html")];

    let report = run_quality_gate(&runner, &gateway, &mut pages, dir.path(), 3, &observer::noop())
        .await;

    assert!(report.passed);
    assert_eq!(report.attempts, 1);
    assert_eq!(provider.call_count(), 0);
    assert_eq!(runner.verify_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn never_green_exhausts_the_attempt_budget() {
    let runner = ScriptedRunner::failing_forever(Some(vec!["home".into()]));
    // Empty script: every repair call fails; partial repair failure must
    // not abort the loop.
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let gateway = gateway_with(&provider);
    let dir = tempfile::tempdir().unwrap();
    let mut pages = vec![page("home", "index.html")];

    let report = run_quality_gate(&runner, &gateway, &mut pages, dir.path(), 3, &observer::noop())
        .await;

    assert!(!report.passed);
    assert_eq!(report.attempts, 3);
    assert!(!report.failures.is_empty());
    // Verification ran on every attempt; repair ran on all but the last.
    assert_eq!(runner.verify_calls.load(Ordering::SeqCst), 3);
    assert_eq!(provider.call_count(), 2);
    // Unrepaired page is left exactly as it was.
    assert_eq!(pages[0].html, PAGE_HTML);
}

#[tokio::test]
async fn repair_is_spliced_and_written_to_disk() {
    let runner = ScriptedRunner::passing_on(2, Some(vec!["home".into()]));
    let provider = Arc::new(ScriptedProvider::new(vec![
        "<main><h1>Sunrise Bakery</h1><p>New copy.</p></main>",
    ]));
    let gateway = gateway_with(&provider);
    let dir = tempfile::tempdir().unwrap();
    let mut pages = vec![page("home", "index.html")];

    let report = run_quality_gate(&runner, &gateway, &mut pages, dir.path(), 3, &observer::noop())
        .await;

    assert!(report.passed);
    assert_eq!(report.attempts, 2);
    assert!(pages[0].html.contains("New copy."));
    assert!(!pages[0].html.contains("Old copy."));
    // Chrome outside <main> survived the splice.
    assert!(pages[0].html.contains("aria-current=\"page\""));
    assert!(pages[0].html.contains("sw-scroll-reveal"));

    let on_disk = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
    assert_eq!(on_disk, pages[0].html);
}

#[tokio::test]
async fn unattributed_failures_implicate_every_page() {
    let runner = ScriptedRunner::passing_on(2, None);
    let provider = Arc::new(ScriptedProvider::new(vec![
        "<main><h1>A</h1></main>",
        "<main><h1>B</h1></main>",
    ]));
    let gateway = gateway_with(&provider);
    let dir = tempfile::tempdir().unwrap();
    let mut pages = vec![page("home", "index.html"), page("about", "about.html")];

    let report = run_quality_gate(&runner, &gateway, &mut pages, dir.path(), 3, &observer::noop())
        .await;

    assert!(report.passed);
    // One repair call per page on the failing attempt.
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn full_document_repair_output_is_rejected() {
    let runner = ScriptedRunner::failing_forever(Some(vec!["home".into()]));
    let provider = Arc::new(ScriptedProvider::new(vec![
        "<!DOCTYPE html><html><body><main><h1>Whole doc</h1></main></body></html>",
    ]));
    let gateway = gateway_with(&provider);
    let dir = tempfile::tempdir().unwrap();
    let mut pages = vec![page("home", "index.html")];

    let report = run_quality_gate(&runner, &gateway, &mut pages, dir.path(), 2, &observer::noop())
        .await;

    assert!(!report.passed);
    // The over-eager full document was not spliced in.
    assert_eq!(pages[0].html, PAGE_HTML);
}
