//! Repository provisioning and git plumbing.
//!
//! Source-control hosting is driven entirely through external commands
//! (`git`, `gh`); success is inferred from exit status and captured
//! output. Provisioning resolves name collisions deterministically: a
//! repository that exists but belongs to a different client pushes the
//! candidate name to `-2`, `-3`, and so on.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::model::slugify;

/// Highest collision suffix tried before provisioning gives up.
const MAX_NAME_SUFFIX: u32 = 9;

/// Marker embedded in the repository description to tie it to a client.
fn client_marker(business_name: &str) -> String {
    format!("[client:{}]", slugify(business_name))
}

/// What the host knows about an existing repository.
#[derive(Debug, Clone)]
pub struct RepoInfo {
    pub name: String,
    pub description: String,
}

/// Repository hosting operations, all externally executed.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Look up a repository by name; `None` means it does not exist.
    async fn lookup(&self, name: &str) -> Result<Option<RepoInfo>>;

    /// Create a repository with the given description.
    async fn create(&self, name: &str, description: &str) -> Result<()>;

    /// Enable static hosting for a repository.
    async fn enable_pages(&self, name: &str) -> Result<()>;

    /// Clone URL for a repository name.
    fn clone_url(&self, name: &str) -> String;
}

/// `gh`-CLI-backed host.
pub struct GitHubCli {
    owner: String,
}

impl GitHubCli {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }

    async fn gh(&self, args: &[&str]) -> Result<Output> {
        let output = Command::new("gh")
            .args(args)
            .output()
            .await
            .context("failed to execute gh")?;
        Ok(output)
    }
}

#[async_trait]
impl RepoHost for GitHubCli {
    async fn lookup(&self, name: &str) -> Result<Option<RepoInfo>> {
        let full = format!("{}/{name}", self.owner);
        let output = self
            .gh(&["repo", "view", &full, "--json", "name,description"])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.to_ascii_lowercase().contains("could not resolve") {
                return Ok(None);
            }
            bail!("gh repo view {full} failed: {}", stderr.trim());
        }
        let value: serde_json::Value = serde_json::from_slice(&output.stdout)
            .context("gh repo view returned non-JSON output")?;
        Ok(Some(RepoInfo {
            name: value["name"].as_str().unwrap_or(name).to_string(),
            description: value["description"].as_str().unwrap_or_default().to_string(),
        }))
    }

    async fn create(&self, name: &str, description: &str) -> Result<()> {
        let full = format!("{}/{name}", self.owner);
        let output = self
            .gh(&["repo", "create", &full, "--public", "--description", description])
            .await?;
        if !output.status.success() {
            bail!(
                "gh repo create {full} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn enable_pages(&self, name: &str) -> Result<()> {
        let endpoint = format!("repos/{}/{name}/pages", self.owner);
        let output = self
            .gh(&[
                "api",
                &endpoint,
                "--method",
                "POST",
                "-f",
                "source[branch]=main",
                "-f",
                "source[path]=/",
            ])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Already enabled comes back as 409; that is success for us.
            if !stderr.contains("409") {
                bail!("enabling pages for {name} failed: {}", stderr.trim());
            }
        }
        Ok(())
    }

    fn clone_url(&self, name: &str) -> String {
        format!("https://github.com/{}/{name}.git", self.owner)
    }
}

/// A provisioned repository with a local working directory.
#[derive(Debug, Clone)]
pub struct SiteRepo {
    pub name: String,
    pub path: PathBuf,
    /// Whether the repository already existed for this client.
    pub reused: bool,
}

impl SiteRepo {
    async fn run_git(&self, args: &[&str]) -> Result<String> {
        run_git_in(&self.path, args).await
    }

    /// Stage everything and commit. A no-change commit is not an error.
    pub async fn commit_all(&self, message: &str) -> Result<()> {
        self.run_git(&["add", "-A"]).await?;
        let status = self.run_git(&["status", "--porcelain"]).await?;
        if status.is_empty() {
            debug!(repo = %self.name, "nothing to commit");
            return Ok(());
        }
        self.run_git(&["commit", "-m", message]).await?;
        Ok(())
    }

    pub async fn push(&self, remote_url: &str) -> Result<()> {
        // Remote may or may not exist yet on a fresh init.
        if self.run_git(&["remote", "get-url", "origin"]).await.is_err() {
            self.run_git(&["remote", "add", "origin", remote_url]).await?;
        }
        self.run_git(&["push", "-u", "origin", "HEAD:main"]).await?;
        Ok(())
    }
}

async fn run_git_in(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .with_context(|| format!("failed to execute git {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Provision a repository for a client, resolving name collisions.
///
/// The desired name derives from the business name. An existing repository
/// carrying this client's marker is reused; one belonging to someone else
/// bumps the suffix. Exhausting suffixes is a fatal provisioning failure.
pub async fn provision_repository(
    host: &dyn RepoHost,
    business_name: &str,
    workspace_base: &Path,
) -> Result<SiteRepo> {
    let base_name = {
        let slug = slugify(business_name);
        if slug.is_empty() {
            "client-site".to_string()
        } else {
            slug
        }
    };
    let marker = client_marker(business_name);

    for suffix in 1..=MAX_NAME_SUFFIX {
        let candidate = if suffix == 1 {
            base_name.clone()
        } else {
            format!("{base_name}-{suffix}")
        };

        match host.lookup(&candidate).await? {
            None => {
                let description = format!("Generated site for {business_name} {marker}");
                host.create(&candidate, &description).await?;
                info!(repo = %candidate, "created repository");
                let path = prepare_working_dir(workspace_base, &candidate).await?;
                run_git_in(&path, &["init", "-b", "main"]).await?;
                configure_identity(&path).await?;
                return Ok(SiteRepo {
                    name: candidate,
                    path,
                    reused: false,
                });
            }
            Some(info) if info.description.contains(&marker) => {
                info!(repo = %candidate, "reusing this client's repository");
                let path = prepare_working_dir(workspace_base, &candidate).await?;
                run_git_in(&path, &["init", "-b", "main"]).await?;
                configure_identity(&path).await?;
                return Ok(SiteRepo {
                    name: candidate,
                    path,
                    reused: true,
                });
            }
            Some(_) => {
                warn!(repo = %candidate, "name taken by a different client, trying next suffix");
            }
        }
    }

    Err(anyhow!(
        "no free repository name for {business_name:?} within {MAX_NAME_SUFFIX} suffixes"
    ))
}

/// Each job gets its own working directory keyed by repository name.
async fn prepare_working_dir(workspace_base: &Path, name: &str) -> Result<PathBuf> {
    let path = workspace_base.join(name);
    tokio::fs::create_dir_all(&path)
        .await
        .with_context(|| format!("creating working directory {}", path.display()))?;
    Ok(path)
}

/// The pipeline commits as itself; builds never depend on a global git
/// identity being configured on the machine.
async fn configure_identity(dir: &Path) -> Result<()> {
    run_git_in(dir, &["config", "user.email", "builds@sitewright.dev"]).await?;
    run_git_in(dir, &["config", "user.name", "sitewright"]).await?;
    Ok(())
}

/// Register a published site as a submodule of the portfolio repository.
/// Soft-fail: problems are logged by the caller, never raised to the job.
pub async fn register_in_portfolio(
    host: &dyn RepoHost,
    portfolio_dir: &Path,
    site_name: &str,
) -> Result<()> {
    let url = host.clone_url(site_name);
    run_git_in(portfolio_dir, &["submodule", "add", &url, site_name]).await?;
    run_git_in(
        portfolio_dir,
        &["commit", "-m", &format!("add {site_name} to portfolio")],
    )
    .await?;
    run_git_in(portfolio_dir, &["push"]).await?;
    Ok(())
}
