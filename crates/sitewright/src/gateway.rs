//! Provider-agnostic text generation with retry/backoff.
//!
//! Two wire formats hide behind one [`TextGenerationProvider`] trait:
//! OpenAI-style chat completions and Anthropic-style messages. The
//! [`AiGateway`] picks its provider once at construction from
//! [`GenerationEndpoint`] and never re-checks per call.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{GenerationEndpoint, ProviderKind};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged block of prompt text.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Error from the generation layer.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration problem — never retried.
    #[error("generation endpoint has no API key configured")]
    MissingCredential,

    #[error("request to generation endpoint failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation endpoint returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("could not read generation text from response: {0}")]
    MalformedResponse(String),
}

/// A text-generation backend speaking one concrete wire format.
#[async_trait]
pub trait TextGenerationProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GatewayError>;
}

/// OpenAI-style `/chat/completions`: bearer auth, system role inline,
/// response text at `choices[0].message.content`.
pub struct ChatCompletionProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionProvider {
    pub fn new(endpoint: &GenerationEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
            model: endpoint.model.clone(),
        }
    }
}

#[async_trait]
impl TextGenerationProvider for ChatCompletionProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GatewayError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body: payload,
            });
        }

        let value: serde_json::Value =
            serde_json::from_str(&payload).map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::MalformedResponse("choices[0].message.content missing".into())
            })
    }
}

/// Anthropic-style `/v1/messages`: api-key header, system content promoted
/// to a top-level field, response concatenated from typed content blocks.
pub struct MessagesProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl MessagesProvider {
    pub fn new(endpoint: &GenerationEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
            model: endpoint.model.clone(),
        }
    }
}

#[async_trait]
impl TextGenerationProvider for MessagesProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GatewayError> {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let user: Vec<&ChatMessage> =
            messages.iter().filter(|m| m.role == Role::User).collect();

        let mut body = json!({
            "model": self.model,
            "messages": user,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body: payload,
            });
        }

        let value: serde_json::Value =
            serde_json::from_str(&payload).map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        let blocks = value["content"]
            .as_array()
            .ok_or_else(|| GatewayError::MalformedResponse("content is not an array".into()))?;
        let text: String = blocks
            .iter()
            .filter(|b| b["type"] == "text")
            .filter_map(|b| b["text"].as_str())
            .collect();
        if text.is_empty() {
            return Err(GatewayError::MalformedResponse(
                "no text content blocks in response".into(),
            ));
        }
        Ok(text)
    }
}

/// Classify error text as a rate-limit signal.
fn is_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("429") || lower.contains("rate_limit") || lower.contains("rate limit")
        || lower.contains("overloaded")
}

fn wait_hint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:retry|try again)[^\d]{0,12}(\d+)\s*s").unwrap())
}

/// Pull a wait hint in seconds out of error text, if one is embedded.
fn parse_wait_hint(text: &str) -> Option<u64> {
    wait_hint_regex().captures(text)?.get(1)?.as_str().parse().ok()
}

/// Backoff before retry `attempt` (1-based) for the given error text.
fn backoff_for(error_text: &str, attempt: u32) -> Duration {
    if is_rate_limit(error_text) {
        match parse_wait_hint(error_text) {
            Some(hinted) => Duration::from_secs(hinted + 2),
            None => Duration::from_secs(25),
        }
    } else {
        Duration::from_secs(u64::from(attempt) * 2)
    }
}

/// The one generation entry point the rest of the pipeline uses.
pub struct AiGateway {
    provider: Box<dyn TextGenerationProvider>,
    default_retries: u32,
}

impl AiGateway {
    /// Build a gateway from endpoint config, selecting the provider once.
    pub fn from_endpoint(
        endpoint: &GenerationEndpoint,
        default_retries: u32,
    ) -> Result<Self, GatewayError> {
        if endpoint.api_key.trim().is_empty() {
            return Err(GatewayError::MissingCredential);
        }
        let provider: Box<dyn TextGenerationProvider> = match endpoint.kind {
            ProviderKind::ChatCompletion => Box::new(ChatCompletionProvider::new(endpoint)),
            ProviderKind::Messages => Box::new(MessagesProvider::new(endpoint)),
        };
        Ok(Self {
            provider,
            default_retries,
        })
    }

    /// Wrap an already-built provider (tests inject fakes through this).
    pub fn with_provider(provider: Box<dyn TextGenerationProvider>, default_retries: u32) -> Self {
        Self {
            provider,
            default_retries,
        }
    }

    /// Generate text, retrying transient failures.
    ///
    /// `retries` is the number of extra attempts after the first; `None`
    /// uses the gateway default. A [`GatewayError::MissingCredential`] is
    /// never retried. Exhausting all attempts returns the last error.
    pub async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
        retries: Option<u32>,
    ) -> Result<String, GatewayError> {
        let retries = retries.unwrap_or(self.default_retries);
        let mut last_error = None;

        for attempt in 1..=(retries + 1) {
            match self.provider.complete(messages, temperature, max_tokens).await {
                Ok(text) => {
                    debug!(attempt, chars = text.len(), "generation succeeded");
                    return Ok(text);
                }
                Err(GatewayError::MissingCredential) => {
                    return Err(GatewayError::MissingCredential)
                }
                Err(e) => {
                    let text = e.to_string();
                    if attempt <= retries {
                        let wait = backoff_for(&text, attempt);
                        warn!(
                            attempt,
                            wait_secs = wait.as_secs(),
                            error = %text,
                            "generation failed, backing off"
                        );
                        tokio::time::sleep(wait).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(GatewayError::MalformedResponse(
            "no attempts were made".into(),
        )))
    }
}
