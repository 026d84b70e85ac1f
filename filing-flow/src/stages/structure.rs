use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    agents::AgentConfig,
    context::{Context, keys},
    error::Result,
    llm::LanguageModel,
    record::StructuredRecord,
    stage::{Stage, StageResult},
};

/// Asks the model for the regulatory fields as JSON.
///
/// Output that does not parse degrades to an empty record and the run goes on;
/// `record_degraded` is set in the context so the outcome can report it.
pub struct StructureExtractionStage;

#[async_trait]
impl Stage for StructureExtractionStage {
    fn id(&self) -> &str {
        "structure_extraction"
    }

    async fn run(
        &self,
        agent: &AgentConfig,
        model: &dyn LanguageModel,
        context: Context,
    ) -> Result<StageResult> {
        let raw_text = super::raw_text(&context)?;
        info!(agent = %agent.id, chars = raw_text.len(), "extracting structured fields");

        let output = model.run_agent(agent, &raw_text, true).await?;

        let (record, degraded) = match StructuredRecord::parse(&output) {
            Ok(record) => (record, false),
            Err(e) => {
                warn!(agent = %agent.id, "structured output did not parse, using empty record: {}", e);
                (StructuredRecord::new(), true)
            }
        };

        context.set(keys::STRUCTURED_RECORD, &record)?;
        context.set(keys::RECORD_DEGRADED, degraded)?;

        let message = if degraded {
            "Structured output unreadable, continuing with an empty record".to_string()
        } else {
            format!("Extracted {} fields", record.len())
        };
        Ok(StageResult::new(message))
    }
}
