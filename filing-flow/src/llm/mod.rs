//! Seam to the external generative-model service.

use async_trait::async_trait;

use crate::{agents::AgentConfig, chat::ChatMessage, error::Result};

#[cfg(feature = "rig")]
pub mod gemini;
#[cfg(test)]
pub(crate) mod scripted;

#[cfg(feature = "rig")]
pub use gemini::GeminiModel;

pub const CHAT_SYSTEM_INSTRUCTION: &str = "You are an expert regulatory consultant. Answer strictly based on the provided 510(k) content context. If unsure, say so.";
pub const CHAT_ACKNOWLEDGEMENT: &str =
    "Understood. I am ready to answer questions about this 510(k) document.";

/// Framing of the context block in the synthetic opening user turn.
pub fn context_turn(context: &str) -> String {
    format!("Here is the context of the 510(k) document you are analyzing:\n\n{context}")
}

/// Single-shot prompt text: the agent's instructions followed by the document.
pub fn agent_prompt(agent: &AgentConfig, content: &str) -> String {
    format!("{}\n\nUser Input:\n{}", agent.system_prompt, content)
}

/// Client of the model service.
///
/// Implementations are stateless per call: everything a request needs is
/// passed in, including the whole conversation for chat turns.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Runs one agent over `content`. With `wants_json` the service is asked
    /// for a JSON body, but the returned text is not guaranteed to parse.
    async fn run_agent(&self, agent: &AgentConfig, content: &str, wants_json: bool)
    -> Result<String>;

    /// Opens a fresh exchange seeded with the context block, replays
    /// `history`, sends `new_message` and returns the reply.
    async fn run_chat(
        &self,
        history: &[ChatMessage],
        new_message: &str,
        context: &str,
    ) -> Result<String>;
}
