use async_trait::async_trait;
use tracing::info;

use crate::{
    agents::AgentConfig,
    context::{Context, keys},
    error::Result,
    llm::LanguageModel,
    stage::{Stage, StageResult},
};

/// Asks the model for a free-form Markdown executive summary.
pub struct SummarizationStage;

#[async_trait]
impl Stage for SummarizationStage {
    fn id(&self) -> &str {
        "summarization"
    }

    async fn run(
        &self,
        agent: &AgentConfig,
        model: &dyn LanguageModel,
        context: Context,
    ) -> Result<StageResult> {
        let raw_text = super::raw_text(&context)?;
        info!(agent = %agent.id, "generating summary");

        let summary = model.run_agent(agent, &raw_text, false).await?;
        context.set(keys::SUMMARY, &summary)?;

        Ok(StageResult::new(format!(
            "Summary generated ({} characters)",
            summary.chars().count()
        )))
    }
}
