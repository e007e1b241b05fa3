//! Process-wide build configuration.
//!
//! One `ForgeConfig` is constructed at startup (env vars, optionally
//! overlaid by a TOML file) and passed into the queue, gateway, and
//! pipeline. Nothing reads ambient state after that.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Which wire format the text-generation endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-style chat completions: bearer auth, system role inline,
    /// response at `choices[0].message.content`.
    ChatCompletion,
    /// Anthropic-style messages: api-key header, system as a top-level
    /// field, response concatenated from typed content blocks.
    Messages,
}

/// Text-generation endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationEndpoint {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Source-control hosting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    /// Account/organization that owns created repositories.
    pub owner: String,
    /// Hostname the published site is served from, e.g. `example.github.io`.
    pub pages_host: String,
    /// Optional portfolio repository that collects sites as submodules.
    #[serde(default)]
    pub portfolio_repo: Option<String>,
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    pub generation: GenerationEndpoint,
    pub repo: RepoConfig,
    /// Base directory for per-job working directories.
    pub workspace_base: PathBuf,
    /// Debate rounds before shipping the last blueprint as-is.
    pub max_debate_rounds: u32,
    /// Verify→repair attempts before shipping with a red gate.
    pub max_fix_attempts: u32,
    /// Extra generation retries after the first attempt.
    pub generation_retries: u32,
    /// Concurrent build lanes (queue permits).
    pub lanes: usize,
    /// Stock-image search credential; absent means image sourcing is a no-op.
    pub image_api_key: Option<String>,
    /// Completion-notification webhook; absent means no notification.
    pub notify_webhook: Option<String>,
}

/// Partial TOML overlay for [`ForgeConfig`].
///
/// Every field is optional so a config file only has to name what it
/// changes from the env-derived defaults.
#[derive(Debug, Default, Deserialize)]
struct ForgeConfigFile {
    generation: Option<GenerationEndpoint>,
    repo: Option<RepoConfig>,
    workspace_base: Option<PathBuf>,
    max_debate_rounds: Option<u32>,
    max_fix_attempts: Option<u32>,
    generation_retries: Option<u32>,
    lanes: Option<usize>,
    image_api_key: Option<String>,
    notify_webhook: Option<String>,
}

impl ForgeConfig {
    /// Build a config from environment variables.
    ///
    /// `FORGE_API_KEY` is the only hard requirement; everything else has a
    /// workable default.
    pub fn from_env() -> Result<Self> {
        let kind = match std::env::var("FORGE_PROVIDER").as_deref() {
            Ok("messages") => ProviderKind::Messages,
            _ => ProviderKind::ChatCompletion,
        };
        let base_url = std::env::var("FORGE_BASE_URL").unwrap_or_else(|_| match kind {
            ProviderKind::ChatCompletion => "https://api.openai.com/v1".into(),
            ProviderKind::Messages => "https://api.anthropic.com".into(),
        });
        let api_key = std::env::var("FORGE_API_KEY")
            .context("FORGE_API_KEY is required for the generation endpoint")?;
        let model = std::env::var("FORGE_MODEL").unwrap_or_else(|_| "gpt-4o".into());

        Ok(Self {
            generation: GenerationEndpoint {
                kind,
                base_url,
                api_key,
                model,
            },
            repo: RepoConfig {
                owner: std::env::var("FORGE_REPO_OWNER").unwrap_or_else(|_| "sitewright".into()),
                pages_host: std::env::var("FORGE_PAGES_HOST")
                    .unwrap_or_else(|_| "sitewright.github.io".into()),
                portfolio_repo: std::env::var("FORGE_PORTFOLIO_REPO").ok(),
            },
            workspace_base: std::env::var("FORGE_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("sitewright")),
            max_debate_rounds: 2,
            max_fix_attempts: 3,
            generation_retries: 2,
            lanes: 1,
            image_api_key: std::env::var("FORGE_IMAGE_API_KEY").ok(),
            notify_webhook: std::env::var("FORGE_NOTIFY_WEBHOOK").ok(),
        })
    }

    /// Overlay values from a TOML file onto this config.
    pub fn overlay_file(mut self, path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let file: ForgeConfigFile =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

        if let Some(generation) = file.generation {
            self.generation = generation;
        }
        if let Some(repo) = file.repo {
            self.repo = repo;
        }
        if let Some(workspace_base) = file.workspace_base {
            self.workspace_base = workspace_base;
        }
        if let Some(v) = file.max_debate_rounds {
            self.max_debate_rounds = v;
        }
        if let Some(v) = file.max_fix_attempts {
            self.max_fix_attempts = v;
        }
        if let Some(v) = file.generation_retries {
            self.generation_retries = v;
        }
        if let Some(v) = file.lanes {
            self.lanes = v.max(1);
        }
        if let Some(v) = file.image_api_key {
            self.image_api_key = Some(v);
        }
        if let Some(v) = file.notify_webhook {
            self.notify_webhook = Some(v);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ForgeConfig {
        ForgeConfig {
            generation: GenerationEndpoint {
                kind: ProviderKind::ChatCompletion,
                base_url: "http://localhost:9999/v1".into(),
                api_key: "test".into(),
                model: "test-model".into(),
            },
            repo: RepoConfig {
                owner: "acme".into(),
                pages_host: "acme.github.io".into(),
                portfolio_repo: None,
            },
            workspace_base: std::env::temp_dir(),
            max_debate_rounds: 2,
            max_fix_attempts: 3,
            generation_retries: 2,
            lanes: 1,
            image_api_key: None,
            notify_webhook: None,
        }
    }

    #[test]
    fn test_overlay_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forge.toml");
        std::fs::write(&path, "max_debate_rounds = 4\nlanes = 2\n").unwrap();

        let config = base_config().overlay_file(&path).unwrap();
        assert_eq!(config.max_debate_rounds, 4);
        assert_eq!(config.lanes, 2);
        // Untouched fields keep their values.
        assert_eq!(config.max_fix_attempts, 3);
        assert_eq!(config.generation.model, "test-model");
    }

    #[test]
    fn test_overlay_lanes_floor_is_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forge.toml");
        std::fs::write(&path, "lanes = 0\n").unwrap();
        let config = base_config().overlay_file(&path).unwrap();
        assert_eq!(config.lanes, 1);
    }

    #[test]
    fn test_overlay_endpoint_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forge.toml");
        std::fs::write(
            &path,
            r#"
[generation]
kind = "messages"
base_url = "https://api.anthropic.com"
api_key = "k"
model = "claude-sonnet-4-5"
"#,
        )
        .unwrap();
        let config = base_config().overlay_file(&path).unwrap();
        assert_eq!(config.generation.kind, ProviderKind::Messages);
    }
}
