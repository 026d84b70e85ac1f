use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{agents::AgentConfig, context::Context, error::Result, llm::LanguageModel};

/// Result of a stage execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Id of the stage that produced this result, filled in by the pipeline
    pub stage_id: String,
    /// Human-readable progress note
    pub status_message: Option<String>,
}

impl StageResult {
    pub fn new(status_message: impl Into<String>) -> Self {
        Self {
            stage_id: String::new(),
            status_message: Some(status_message.into()),
        }
    }
}

/// One step of the analysis pipeline.
///
/// A stage reads the document from the run's [`Context`], calls the model
/// with the agent assigned to its position and writes its output back.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique identifier for this stage
    fn id(&self) -> &str;

    async fn run(
        &self,
        agent: &AgentConfig,
        model: &dyn LanguageModel,
        context: Context,
    ) -> Result<StageResult>;
}
