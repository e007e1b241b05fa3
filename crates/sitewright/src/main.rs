use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use sitewright::config::ForgeConfig;
use sitewright::gateway::AiGateway;
use sitewright::model::{BuildJob, ClientBrief};
use sitewright::observer::TracingObserver;
use sitewright::pipeline::repo::GitHubCli;
use sitewright::pipeline::PhasePipeline;
use sitewright::quality_gate::{CommandVerifier, StaticVerifier, VerificationRunner};
use sitewright::queue::BuildQueue;
use sitewright::session::MemorySessionStore;

#[derive(Parser)]
#[command(name = "sitewright", about = "AI-driven website build pipeline")]
struct Cli {
    /// Optional TOML config overlaying the environment.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build and deploy a site from a client brief.
    Build {
        /// Business name, e.g. "Sunrise Bakery".
        #[arg(long)]
        name: String,
        /// Niche or industry, e.g. "artisan bread".
        #[arg(long)]
        niche: String,
        /// What the site should achieve.
        #[arg(long)]
        goals: String,
        /// Contact email shown on the site.
        #[arg(long)]
        email: Option<String>,
        /// Existing site to analyze for context.
        #[arg(long)]
        existing_site: Option<String>,
        /// Free-form brand notes.
        #[arg(long)]
        brand_notes: Option<String>,
        /// External verification command; defaults to built-in checks.
        #[arg(long)]
        verifier: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ForgeConfig::from_env()?;
    if let Some(path) = &cli.config {
        config = config.overlay_file(path)?;
    }

    match cli.command {
        Command::Build {
            name,
            niche,
            goals,
            email,
            existing_site,
            brand_notes,
            verifier,
        } => {
            let brief = ClientBrief {
                business_name: name,
                niche,
                goals,
                contact_email: email,
                existing_site,
                brand_notes,
            };

            let gateway = Arc::new(AiGateway::from_endpoint(
                &config.generation,
                config.generation_retries,
            )?);
            let host = Arc::new(GitHubCli::new(config.repo.owner.clone()));
            let runner: Arc<dyn VerificationRunner> = match verifier {
                Some(program) => Arc::new(CommandVerifier::new(program)),
                None => Arc::new(StaticVerifier),
            };
            let store = Arc::new(MemorySessionStore::new());
            let observer = Arc::new(TracingObserver);

            let pipeline = Arc::new(PhasePipeline::new(
                config.clone(),
                gateway,
                host,
                runner,
                store.clone(),
                observer,
            ));
            let queue = BuildQueue::new(pipeline, store.clone(), config.lanes);

            let job_id = format!("build-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S"));
            queue.enqueue(BuildJob::new(&job_id, brief));
            queue.drain().await;

            match store.job(&job_id) {
                Some(job) => {
                    info!(job = %job.id, status = %job.status, "done");
                    if let Some(error) = job.error {
                        anyhow::bail!("build failed: {error}");
                    }
                }
                None => anyhow::bail!("job record missing after drain"),
            }
        }
    }

    Ok(())
}
