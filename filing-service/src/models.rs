use serde::{Deserialize, Serialize};

use filing_flow::{AgentConfig, ChatMessage};

pub const PROMPT_SNIPPET_CHARS: usize = 150;

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub text: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Falls back to the working input when absent.
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub status: &'static str,
    pub reply: String,
    pub history: Vec<ChatMessage>,
}

/// One row of the pipeline listing.
#[derive(Debug, Serialize)]
pub struct AgentListing {
    pub stage: usize,
    pub stage_id: String,
    pub id: String,
    pub label: String,
    pub model: String,
    pub max_tokens: u64,
    pub prompt_snippet: String,
    pub status: &'static str,
}

impl AgentListing {
    pub fn new(stage: usize, stage_id: &str, agent: &AgentConfig, completed: bool) -> Self {
        Self {
            stage,
            stage_id: stage_id.to_string(),
            id: agent.id.clone(),
            label: agent.label.clone(),
            model: agent.default_model.clone(),
            max_tokens: agent.max_tokens,
            prompt_snippet: agent.prompt_snippet(PROMPT_SNIPPET_CHARS),
            status: if completed { "completed" } else { "pending" },
        }
    }
}
