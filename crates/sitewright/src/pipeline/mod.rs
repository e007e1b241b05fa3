//! Phase pipeline — the ordered stage sequence for one build job.
//!
//! Each stage has a narrow contract and its own failure policy. Only
//! fatal classifications (provisioning failure, zero-page blueprint,
//! missing design-system field, failed repository push) abort the job;
//! everything else degrades, falls back, or is merely logged. A completed
//! job always has a publishable best-effort result, even with a red
//! quality gate.

pub mod assemble;
pub mod pages;
pub mod repo;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ForgeConfig;
use crate::council::{self, CouncilConfig, CouncilError};
use crate::gateway::AiGateway;
use crate::images::ImageSearch;
use crate::model::{BuildJob, BuildPhase, JobStatus, PageArtifact};
use crate::notify::Notifier;
use crate::observer::SharedObserver;
use crate::quality_gate::{self, GateReport, VerificationRunner};
use crate::scrape;
use crate::session::SessionStore;

use repo::RepoHost;

/// Stage failure that aborts the job. Degraded outcomes never take this
/// form; they are absorbed inside their stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{phase} failed: {message}")]
    Fatal {
        phase: BuildPhase,
        message: String,
    },
}

impl StageError {
    pub fn fatal(phase: BuildPhase, message: impl Into<String>) -> Self {
        Self::Fatal {
            phase,
            message: message.into(),
        }
    }

    pub(crate) fn fatal_design(message: impl Into<String>) -> Self {
        Self::fatal(BuildPhase::DesignSystem, message)
    }

    pub fn phase(&self) -> BuildPhase {
        match self {
            Self::Fatal { phase, .. } => *phase,
        }
    }
}

/// Everything a finished build hands back.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub repo_name: String,
    pub site_url: String,
    pub pages: Vec<PageArtifact>,
    pub gate: GateReport,
    pub blueprint_approved: bool,
    pub deployed: bool,
}

/// The ordered stage sequence, wired once and run per job.
pub struct PhasePipeline {
    config: ForgeConfig,
    gateway: Arc<AiGateway>,
    host: Arc<dyn RepoHost>,
    runner: Arc<dyn VerificationRunner>,
    store: Arc<dyn SessionStore>,
    observer: SharedObserver,
    images: ImageSearch,
    notifier: Notifier,
}

impl PhasePipeline {
    pub fn new(
        config: ForgeConfig,
        gateway: Arc<AiGateway>,
        host: Arc<dyn RepoHost>,
        runner: Arc<dyn VerificationRunner>,
        store: Arc<dyn SessionStore>,
        observer: SharedObserver,
    ) -> Self {
        let images = ImageSearch::new(config.image_api_key.clone());
        let notifier = Notifier::new(config.notify_webhook.clone());
        Self {
            config,
            gateway,
            host,
            runner,
            store,
            observer,
            images,
            notifier,
        }
    }

    async fn enter_phase(&self, job: &mut BuildJob, phase: BuildPhase, detail: &str) {
        job.record_phase(phase, detail);
        self.store.upsert_job(job).await;
        self.store
            .append_log(&job.id, &format!("{phase}: {detail}"))
            .await;
        self.observer
            .on_event("phase", json!({ "job": job.id, "phase": phase.to_string() }));
        self.observer.on_log(&format!("[{}] {phase}: {detail}", job.id));
    }

    /// Run every stage for one job. The caller owns status bookkeeping for
    /// the error path; on success the job is left `Complete`.
    pub async fn run(&self, job: &mut BuildJob) -> Result<BuildReport, StageError> {
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        self.store.upsert_job(job).await;

        // Optional existing-site analysis. Best-effort by construction.
        let existing_site = job.brief.existing_site.clone();
        let analysis = match existing_site {
            Some(url) => {
                self.enter_phase(job, BuildPhase::SiteScrape, &url).await;
                scrape::analyze_existing_site(&url).await
            }
            None => None,
        };

        self.enter_phase(job, BuildPhase::Provisioning, "resolving repository name")
            .await;
        let site_repo = repo::provision_repository(
            self.host.as_ref(),
            &job.brief.business_name,
            &self.config.workspace_base,
        )
        .await
        .map_err(|e| StageError::fatal(BuildPhase::Provisioning, e.to_string()))?;

        self.enter_phase(job, BuildPhase::Council, "debating the blueprint")
            .await;
        let council_config = CouncilConfig {
            max_rounds: self.config.max_debate_rounds,
            ..CouncilConfig::default()
        };
        let outcome = council::run_council(
            &self.gateway,
            &job.brief,
            analysis.as_deref(),
            &council_config,
            &self.observer,
        )
        .await
        .map_err(|e| match e {
            CouncilError::InvalidBlueprint { .. } => {
                StageError::fatal(BuildPhase::Council, e.to_string())
            }
            CouncilError::Gateway(e) => StageError::fatal(BuildPhase::Council, e.to_string()),
        })?;
        let mut blueprint = outcome.blueprint;
        if !outcome.approved {
            info!(rounds = outcome.rounds, "shipping unapproved blueprint best-effort");
        }

        self.enter_phase(job, BuildPhase::CreativeDirection, "setting direction")
            .await;
        let creative =
            pages::generate_creative(&self.gateway, &blueprint, &self.observer).await;

        self.enter_phase(job, BuildPhase::DesignSystem, "building shared chrome")
            .await;
        let design =
            pages::generate_design_system(&self.gateway, &mut blueprint, &creative).await?;

        self.enter_phase(
            job,
            BuildPhase::PageGeneration,
            &format!("{} page(s)", blueprint.pages.len()),
        )
        .await;
        let mut artifacts = Vec::with_capacity(blueprint.pages.len());
        for page in &blueprint.pages {
            let artifact = pages::generate_page(
                &self.gateway,
                &blueprint,
                &creative,
                &design,
                page,
                &self.observer,
            )
            .await;
            artifacts.push(artifact);
        }

        let mut heroes = BTreeMap::new();
        if self.images.enabled() {
            self.enter_phase(job, BuildPhase::ImageSourcing, "fetching hero images")
                .await;
            for page in &blueprint.pages {
                let query = creative
                    .image_terms
                    .get(&page.slug)
                    .cloned()
                    .unwrap_or_else(|| format!("{} {}", job.brief.niche, page.title));
                if let Some(relative) = self
                    .images
                    .fetch_hero(&site_repo.path, &page.slug, &query)
                    .await
                {
                    heroes.insert(page.slug.clone(), relative);
                }
            }
        }

        self.enter_phase(job, BuildPhase::Assembly, "stitching the site")
            .await;
        assemble::stitch_navigation(&mut artifacts);
        for artifact in artifacts.iter_mut() {
            assemble::inject_scroll_script(artifact);
        }
        assemble::apply_hero_images(&mut artifacts, &heroes);
        let site_url = format!(
            "https://{}/{}/",
            self.config.repo.pages_host, site_repo.name
        );
        assemble::write_site(&site_repo.path, &artifacts, &blueprint, &design, &site_url)
            .await
            .map_err(|e| StageError::fatal(BuildPhase::Assembly, e.to_string()))?;
        for issue in assemble::validate_internal_links(&artifacts) {
            warn!(%issue, "link validation");
            self.observer.on_log(&format!("link check: {issue}"));
        }

        self.enter_phase(job, BuildPhase::VisualPolish, "polishing pages")
            .await;
        let mut polished = Vec::new();
        for artifact in artifacts.iter_mut() {
            if pages::polish_page(&self.gateway, artifact).await {
                // Polish may regenerate chrome; re-apply the idempotent
                // assembly passes before the file is rewritten.
                assemble::inject_scroll_script(artifact);
                polished.push(artifact.slug.clone());
            }
        }
        assemble::stitch_navigation(&mut artifacts);
        // Rewrite only after re-stitching, so the deployed files carry the
        // same nav active state as the recorded artifacts.
        for artifact in artifacts.iter().filter(|a| polished.contains(&a.slug)) {
            if let Err(e) =
                tokio::fs::write(site_repo.path.join(&artifact.filename), &artifact.html).await
            {
                warn!(slug = %artifact.slug, error = %e, "failed to write polished page");
            }
        }

        self.enter_phase(job, BuildPhase::QualityGate, "verifying pages")
            .await;
        let gate = quality_gate::run_quality_gate(
            self.runner.as_ref(),
            &self.gateway,
            &mut artifacts,
            &site_repo.path,
            self.config.max_fix_attempts,
            &self.observer,
        )
        .await;
        self.store.record_artifacts(&job.id, &artifacts).await;

        self.enter_phase(job, BuildPhase::Deployment, "publishing")
            .await;
        let deployed = self.deploy(&site_repo).await?;

        self.enter_phase(job, BuildPhase::Notification, "notifying")
            .await;
        self.notifier
            .notify_complete(&job.id, &site_url, gate.passed)
            .await;

        job.status = JobStatus::Complete;
        job.finished_at = Some(Utc::now());
        self.store.upsert_job(job).await;
        self.observer.on_event(
            "build_complete",
            json!({
                "job": job.id,
                "repo": site_repo.name,
                "site_url": site_url,
                "pages": artifacts.len(),
                "gate_passed": gate.passed,
                "gate_attempts": gate.attempts,
                "blueprint_approved": outcome.approved,
            }),
        );

        Ok(BuildReport {
            repo_name: site_repo.name,
            site_url,
            pages: artifacts,
            gate,
            blueprint_approved: outcome.approved,
            deployed,
        })
    }

    /// Push is the one deployment sub-step the build cannot complete
    /// without; hosting enablement and portfolio registration soft-fail.
    async fn deploy(&self, site_repo: &repo::SiteRepo) -> Result<bool, StageError> {
        site_repo
            .commit_all("Publish generated site")
            .await
            .map_err(|e| StageError::fatal(BuildPhase::Deployment, e.to_string()))?;
        let remote = self.host.clone_url(&site_repo.name);
        site_repo
            .push(&remote)
            .await
            .map_err(|e| StageError::fatal(BuildPhase::Deployment, e.to_string()))?;

        let mut fully = true;
        if let Err(e) = self.host.enable_pages(&site_repo.name).await {
            warn!(repo = %site_repo.name, error = %e, "could not enable hosting");
            fully = false;
        }

        if let Some(portfolio) = &self.config.repo.portfolio_repo {
            let portfolio_dir = self.config.workspace_base.join(portfolio);
            if portfolio_dir.is_dir() {
                if let Err(e) = repo::register_in_portfolio(
                    self.host.as_ref(),
                    &portfolio_dir,
                    &site_repo.name,
                )
                .await
                {
                    warn!(error = %e, "portfolio registration failed");
                    fully = false;
                }
            } else {
                warn!(portfolio = %portfolio, "portfolio working copy missing, skipping registration");
                fully = false;
            }
        }
        Ok(fully)
    }
}

#[async_trait]
impl crate::queue::JobExecutor for PhasePipeline {
    async fn execute(&self, job: &mut BuildJob) -> anyhow::Result<()> {
        let report = self.run(job).await?;
        info!(
            job = %job.id,
            repo = %report.repo_name,
            site = %report.site_url,
            pages = report.pages.len(),
            gate_passed = report.gate.passed,
            "build shipped"
        );
        Ok(())
    }
}
