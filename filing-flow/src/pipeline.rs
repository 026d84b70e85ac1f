use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::{
    agents::{AgentConfig, AgentRegistry},
    context::{Context, keys},
    error::{FlowError, Result},
    llm::LanguageModel,
    record::StructuredRecord,
    stage::{Stage, StageResult},
    stages::{StructureExtractionStage, SummarizationStage},
};

/// What a completed run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub record: StructuredRecord,
    pub summary: String,
    /// Stage 1 output did not parse and the record fell back to empty.
    pub degraded: bool,
    pub stage_results: Vec<StageResult>,
}

/// Ordered stages, each paired with the agent at the same position.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    agents: AgentRegistry,
}

impl Pipeline {
    /// Structure extraction, then summarization.
    pub fn standard(agents: AgentRegistry) -> Result<Self> {
        PipelineBuilder::new(agents)
            .add_stage(Arc::new(StructureExtractionStage))
            .add_stage(Arc::new(SummarizationStage))
            .build()
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Stage ids with their agents, in execution order.
    pub fn stages(&self) -> impl Iterator<Item = (&str, &AgentConfig)> {
        self.stages
            .iter()
            .zip(self.agents.iter())
            .map(|(stage, agent)| (stage.id(), agent))
    }

    /// Runs every stage in order over `raw_text`. A stage starts only after
    /// the previous one finished; the first error aborts the run.
    pub async fn execute(
        &self,
        model: &dyn LanguageModel,
        raw_text: &str,
    ) -> Result<PipelineOutput> {
        let context = Context::for_document(raw_text);
        let mut stage_results = Vec::with_capacity(self.stages.len());

        for (index, stage) in self.stages.iter().enumerate() {
            let agent = self.agents.stage(index).ok_or_else(|| {
                FlowError::InvalidAgent(format!("no agent for stage {}", index))
            })?;

            info!(stage = %stage.id(), index, agent = %agent.id, "running stage");
            let mut result = stage.run(agent, model, context.clone()).await?;
            result.stage_id = stage.id().to_string();
            stage_results.push(result);
        }

        Ok(PipelineOutput {
            record: context.get(keys::STRUCTURED_RECORD).unwrap_or_default(),
            summary: context.get(keys::SUMMARY).unwrap_or_default(),
            degraded: context.get(keys::RECORD_DEGRADED).unwrap_or(false),
            stage_results,
        })
    }
}

/// Builder for creating pipelines
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    agents: AgentRegistry,
}

impl PipelineBuilder {
    pub fn new(agents: AgentRegistry) -> Self {
        Self {
            stages: Vec::new(),
            agents,
        }
    }

    pub fn add_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Fails when there are no stages or fewer agents than stages.
    pub fn build(self) -> Result<Pipeline> {
        if self.stages.is_empty() {
            return Err(FlowError::InvalidAgent("pipeline has no stages".to_string()));
        }
        if self.agents.len() < self.stages.len() {
            return Err(FlowError::InvalidAgent(format!(
                "{} stages but only {} agents",
                self.stages.len(),
                self.agents.len()
            )));
        }
        Ok(Pipeline {
            stages: self.stages,
            agents: self.agents,
        })
    }
}
