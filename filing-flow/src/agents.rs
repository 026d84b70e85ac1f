//! Agent registry: the ordered list of agents that drive the pipeline stages.
//!
//! Stage `n` of the pipeline always runs with the agent at index `n`, so the
//! order of the registry is part of the pipeline's semantics.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{FlowError, Result};

pub const STRUCTURE_AGENT_ID: &str = "extract_510k_structured";
pub const SUMMARY_AGENT_ID: &str = "generate_dashboard_summary";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_MAX_TOKENS: u64 = 4000;

const STRUCTURE_PROMPT: &str = r#"You are an expert FDA regulatory consultant. Extract the following fields from the 510(k) summary provided by the user. Return ONLY valid JSON.
Fields:
- device_name (string)
- submitter_information (dictionary of key-value pairs)
- classification (string)
- regulation_number (string)
- product_code (string)
- panel (string)
- predicates (string)
- indications_for_use (string)
- technological_characteristics (string - summary)
- performance_data (string - summary)
- substantial_equivalence_discussion (string - summary)"#;

const SUMMARY_PROMPT: &str = r#"You are a medical device analyst. Write a comprehensive Markdown executive summary of this 510(k).
Focus on:
1. The device's intended use.
2. How it compares to the predicate.
3. Key performance testing results.
4. Regulatory conclusion.

Use bolding, bullet points, and clear headers."#;

/// Configuration of one pipeline agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub label: String,
    pub default_model: String,
    pub system_prompt: String,
    pub max_tokens: u64,
}

impl AgentConfig {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        default_model: impl Into<String>,
        system_prompt: impl Into<String>,
        max_tokens: u64,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            default_model: default_model.into(),
            system_prompt: system_prompt.into(),
            max_tokens,
        }
    }

    /// Leading characters of the prompt, for listings.
    pub fn prompt_snippet(&self, max_chars: usize) -> String {
        self.system_prompt.chars().take(max_chars).collect()
    }
}

/// Read-only, ordered set of agents.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct AgentRegistry {
    agents: Vec<AgentConfig>,
}

impl AgentRegistry {
    /// Validates the list: at least one agent, unique ids, positive token budgets.
    pub fn new(agents: Vec<AgentConfig>) -> Result<Self> {
        if agents.is_empty() {
            return Err(FlowError::InvalidAgent("registry is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for agent in &agents {
            if agent.id.trim().is_empty() {
                return Err(FlowError::InvalidAgent("agent id is empty".to_string()));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(FlowError::InvalidAgent(format!(
                    "duplicate agent id '{}'",
                    agent.id
                )));
            }
            if agent.max_tokens == 0 {
                return Err(FlowError::InvalidAgent(format!(
                    "agent '{}' has a zero token budget",
                    agent.id
                )));
            }
        }

        Ok(Self { agents })
    }

    /// Structure extraction followed by summarization.
    pub fn default_510k() -> Self {
        Self {
            agents: vec![
                AgentConfig::new(
                    STRUCTURE_AGENT_ID,
                    "Structure Extractor",
                    DEFAULT_MODEL,
                    STRUCTURE_PROMPT,
                    DEFAULT_MAX_TOKENS,
                ),
                AgentConfig::new(
                    SUMMARY_AGENT_ID,
                    "Executive Summarizer",
                    DEFAULT_MODEL,
                    SUMMARY_PROMPT,
                    DEFAULT_MAX_TOKENS,
                ),
            ],
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let agents: Vec<AgentConfig> = serde_yaml::from_str(yaml)?;
        Self::new(agents)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Agent for a zero-based stage position.
    pub fn stage(&self, index: usize) -> Option<&AgentConfig> {
        self.agents.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentConfig> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::default_510k()
    }
}
