//! Council — bounded-round Strategist/Critic debate over the blueprint.
//!
//! The Strategist proposes (round 1) or revises (later rounds) a site
//! blueprint; the Critic scores it and flags issues. The loop exits on
//! approval or round exhaustion, and round exhaustion still ships the last
//! proposal. Proceeding with an unapproved blueprint is policy, not a bug.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::extract;
use crate::gateway::{AiGateway, ChatMessage, GatewayError};
use crate::model::{sanitize_blueprint, Blueprint, ClientBrief};
use crate::observer::SharedObserver;
use crate::prompts;

/// Council tuning knobs.
#[derive(Debug, Clone)]
pub struct CouncilConfig {
    pub max_rounds: u32,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            max_rounds: 2,
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// Severity of a critique issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CritiqueSeverity {
    Blocking,
    Warning,
    Suggestion,
}

impl Default for CritiqueSeverity {
    fn default() -> Self {
        Self::Warning
    }
}

/// One issue the Critic raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritiqueIssue {
    #[serde(default)]
    pub severity: CritiqueSeverity,
    pub message: String,
}

/// The Critic's structured verdict on one proposal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Critique {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub issues: Vec<CritiqueIssue>,
}

/// Error from the council stage.
#[derive(Debug, Error)]
pub enum CouncilError {
    /// No round ever produced a blueprint with at least one page.
    #[error("no usable blueprint after {rounds} round(s): {detail}")]
    InvalidBlueprint { rounds: u32, detail: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// What the council settled on.
#[derive(Debug, Clone)]
pub struct CouncilOutcome {
    pub blueprint: Blueprint,
    pub approved: bool,
    pub rounds: u32,
    pub final_critique: Option<Critique>,
}

/// Run the debate to convergence or round exhaustion.
pub async fn run_council(
    gateway: &AiGateway,
    brief: &ClientBrief,
    site_analysis: Option<&str>,
    config: &CouncilConfig,
    observer: &SharedObserver,
) -> Result<CouncilOutcome, CouncilError> {
    let max_rounds = config.max_rounds.max(1);
    let mut current: Option<Blueprint> = None;
    let mut last_critique: Option<Critique> = None;
    let mut last_parse_error = String::new();
    let mut approved = false;
    let mut rounds_run = 0;

    for round in 1..=max_rounds {
        rounds_run = round;

        let proposal_prompt = match (&current, &last_critique) {
            (Some(blueprint), Some(critique)) => revision_prompt(brief, blueprint, critique),
            _ => fresh_prompt(brief, site_analysis),
        };
        observer.on_event(
            "council_round",
            json!({ "round": round, "speaker": "strategist", "action": "propose" }),
        );

        let raw = match gateway
            .generate(
                &[
                    ChatMessage::system(prompts::STRATEGIST_PREAMBLE),
                    ChatMessage::user(proposal_prompt),
                ],
                config.temperature,
                config.max_tokens,
                None,
            )
            .await
        {
            Ok(raw) => raw,
            // With a blueprint already in hand, a dead strategist ends the
            // debate rather than the build; best-effort shipping wins.
            Err(e) if current.is_some() => {
                warn!(round, error = %e, "strategist unavailable, shipping the held blueprint");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        match parse_blueprint(&raw) {
            Ok(blueprint) => {
                observer.on_log(&format!(
                    "round {round}: strategist proposed {} page(s)",
                    blueprint.pages.len()
                ));
                current = Some(blueprint);
            }
            Err(detail) => {
                warn!(round, %detail, "strategist output unusable, keeping prior proposal");
                last_parse_error = detail;
            }
        }

        // Without a proposal there is nothing for the Critic to review.
        let Some(candidate) = current.as_ref() else {
            continue;
        };
        observer.on_event(
            "council_round",
            json!({ "round": round, "speaker": "critic", "action": "review" }),
        );
        let critique = review(gateway, brief, candidate, config).await;
        info!(
            round,
            score = critique.score,
            approved = critique.approved,
            issues = critique.issues.len(),
            "critic verdict"
        );
        observer.on_event(
            "council_round",
            json!({
                "round": round,
                "speaker": "critic",
                "action": "verdict",
                "approved": critique.approved,
                "score": critique.score,
            }),
        );

        approved = critique.approved;
        last_critique = Some(critique);
        if approved {
            break;
        }
    }

    let mut blueprint = current.ok_or(CouncilError::InvalidBlueprint {
        rounds: rounds_run,
        detail: last_parse_error,
    })?;
    if blueprint.pages.is_empty() {
        return Err(CouncilError::InvalidBlueprint {
            rounds: rounds_run,
            detail: "blueprint has an empty page list".into(),
        });
    }

    sanitize_blueprint(&mut blueprint, brief);

    Ok(CouncilOutcome {
        blueprint,
        approved,
        rounds: rounds_run,
        final_critique: last_critique,
    })
}

fn fresh_prompt(brief: &ClientBrief, site_analysis: Option<&str>) -> String {
    let mut prompt = format!(
        "Client brief:\n{}\n",
        serde_json::to_string_pretty(brief).unwrap_or_default()
    );
    if let Some(analysis) = site_analysis {
        if !analysis.trim().is_empty() {
            prompt.push_str("\nNotes from the client's existing site:\n");
            prompt.push_str(analysis);
            prompt.push('\n');
        }
    }
    prompt.push_str("\nPropose the blueprint.");
    prompt
}

fn revision_prompt(brief: &ClientBrief, blueprint: &Blueprint, critique: &Critique) -> String {
    format!(
        "Client brief:\n{}\n\nYour previous blueprint:\n{}\n\nCritic feedback:\n{}\n\n\
         Revise the blueprint to address the blocking and warning issues. \
         Keep what the critic did not object to.",
        serde_json::to_string_pretty(brief).unwrap_or_default(),
        serde_json::to_string_pretty(blueprint).unwrap_or_default(),
        serde_json::to_string_pretty(critique).unwrap_or_default(),
    )
}

fn parse_blueprint(raw: &str) -> Result<Blueprint, String> {
    let value = extract::extract_json(raw).map_err(|e| e.to_string())?;
    let blueprint: Blueprint = serde_json::from_value(value).map_err(|e| e.to_string())?;
    if blueprint.pages.is_empty() {
        return Err("proposal has no pages".into());
    }
    Ok(blueprint)
}

/// Ask the Critic for a verdict. A critic that cannot be reached or cannot
/// be parsed counts as "not approved" with no issues; the loop moves on.
async fn review(
    gateway: &AiGateway,
    brief: &ClientBrief,
    blueprint: &Blueprint,
    config: &CouncilConfig,
) -> Critique {
    let prompt = format!(
        "Client brief:\n{}\n\nProposed blueprint:\n{}\n\nReview it.",
        serde_json::to_string_pretty(brief).unwrap_or_default(),
        serde_json::to_string_pretty(blueprint).unwrap_or_default(),
    );
    let raw = match gateway
        .generate(
            &[
                ChatMessage::system(prompts::CRITIC_PREAMBLE),
                ChatMessage::user(prompt),
            ],
            0.2,
            config.max_tokens,
            None,
        )
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "critic unavailable, treating round as unapproved");
            return Critique::default();
        }
    };

    extract::extract_json(&raw)
        .ok()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_else(|| {
            warn!("critic output unparseable, treating round as unapproved");
            Critique::default()
        })
}
