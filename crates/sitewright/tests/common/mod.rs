//! Shared test doubles: a scripted text-generation provider.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use sitewright::gateway::{ChatMessage, GatewayError, TextGenerationProvider};

/// Provider that replays canned responses in order and records every call's
/// system preamble. An exhausted script fails the call, which exercises
/// the same degrade paths a flaky backend would.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerationProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, GatewayError> {
        let system = messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(system);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GatewayError::MalformedResponse("script exhausted".into()))
    }
}

/// Boxable handle that lets a test keep inspecting the provider after the
/// gateway takes ownership of its half.
pub struct SharedProvider(pub std::sync::Arc<ScriptedProvider>);

#[async_trait]
impl TextGenerationProvider for SharedProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GatewayError> {
        self.0.complete(messages, temperature, max_tokens).await
    }
}
