//! Gemini client built on `rig`.

use async_trait::async_trait;
use rig::{
    client::CompletionClient,
    completion::{Chat, Message, Prompt},
    providers::gemini,
};
use serde_json::{Value, json};
use std::fmt::Display;
use std::future::IntoFuture;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error};

use super::{
    CHAT_ACKNOWLEDGEMENT, CHAT_SYSTEM_INSTRUCTION, LanguageModel, agent_prompt, context_turn,
};
use crate::{
    agents::{AgentConfig, DEFAULT_MODEL},
    chat::{ChatMessage, ChatRole},
    error::{FlowError, Result},
};

pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Model client holding a lazily-built provider handle.
///
/// The handle is created on the first call and reused afterwards. Without a
/// credential every call fails with `MissingCredential`.
pub struct GeminiModel {
    api_key: Option<String>,
    chat_model: String,
    timeout: Option<Duration>,
    client: OnceLock<gemini::Client>,
    reported_missing_key: AtomicBool,
}

impl GeminiModel {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            chat_model: DEFAULT_MODEL.to_string(),
            timeout: None,
            client: OnceLock::new(),
            reported_missing_key: AtomicBool::new(false),
        }
    }

    /// Reads the credential from the first non-empty of [`API_KEY_VARS`].
    pub fn from_env() -> Self {
        let api_key = API_KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()));
        Self::new(api_key)
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn client(&self) -> Result<&gemini::Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }

        let Some(api_key) = self.api_key.as_deref() else {
            if !self.reported_missing_key.swap(true, Ordering::Relaxed) {
                error!("Gemini API key is missing; set GEMINI_API_KEY or API_KEY");
            }
            return Err(FlowError::MissingCredential(
                "set GEMINI_API_KEY or API_KEY".to_string(),
            ));
        };

        Ok(self.client.get_or_init(|| gemini::Client::new(api_key)))
    }

    async fn bounded<F, E>(&self, request: F) -> Result<String>
    where
        F: IntoFuture<Output = std::result::Result<String, E>>,
        E: Display,
    {
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request.into_future())
                .await
                .map_err(|_| {
                    FlowError::ModelService(format!("request timed out after {limit:?}"))
                })?,
            None => request.into_future().await,
        };
        outcome.map_err(|e| FlowError::ModelService(e.to_string()))
    }
}

fn to_rig_message(message: &ChatMessage) -> Message {
    match message.role {
        ChatRole::User => Message::user(message.content.clone()),
        ChatRole::Assistant => Message::assistant(message.content.clone()),
    }
}

/// Extra request parameters. The provider requires `generationConfig` on
/// every request; JSON mode only sets its MIME type.
fn generation_params(wants_json: bool) -> Value {
    if wants_json {
        json!({ "generationConfig": { "responseMimeType": "application/json" } })
    } else {
        json!({ "generationConfig": {} })
    }
}

/// Everything one single-shot agent call sends.
#[derive(Debug, Clone, PartialEq)]
struct AgentRequest {
    model: String,
    max_tokens: u64,
    prompt: String,
    params: Value,
}

impl AgentRequest {
    fn new(agent: &AgentConfig, content: &str, wants_json: bool) -> Self {
        Self {
            model: agent.default_model.clone(),
            max_tokens: agent.max_tokens,
            prompt: agent_prompt(agent, content),
            params: generation_params(wants_json),
        }
    }
}

/// Seeded context turn and acknowledgement, then the prior history.
fn chat_turns(history: &[ChatMessage], context: &str) -> Vec<Message> {
    let mut turns = Vec::with_capacity(history.len() + 2);
    turns.push(Message::user(context_turn(context)));
    turns.push(Message::assistant(CHAT_ACKNOWLEDGEMENT));
    turns.extend(history.iter().map(to_rig_message));
    turns
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn run_agent(
        &self,
        agent: &AgentConfig,
        content: &str,
        wants_json: bool,
    ) -> Result<String> {
        let client = self.client()?;
        let request = AgentRequest::new(agent, content, wants_json);

        let model_agent = client
            .agent(&request.model)
            .max_tokens(request.max_tokens)
            .additional_params(request.params)
            .build();

        debug!(agent = %agent.id, model = %request.model, wants_json, "calling model");
        self.bounded(model_agent.prompt(request.prompt.as_str())).await
    }

    async fn run_chat(
        &self,
        history: &[ChatMessage],
        new_message: &str,
        context: &str,
    ) -> Result<String> {
        let client = self.client()?;
        let model_agent = client
            .agent(&self.chat_model)
            .preamble(CHAT_SYSTEM_INSTRUCTION)
            .additional_params(generation_params(false))
            .build();

        let turns = chat_turns(history, context);

        debug!(model = %self.chat_model, turns = turns.len(), "sending chat turn");
        self.bounded(model_agent.chat(new_message.to_string(), turns))
            .await
    }
}
