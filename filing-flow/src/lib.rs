//! Analysis flow for 510(k) filings: a two-stage model pipeline (structured
//! extraction, then summarization), an append-only snapshot store and a chat
//! session grounded in the current document.

pub mod agents;
pub mod chat;
pub mod context;
pub mod controller;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod record;
pub mod snapshot;
pub mod stage;
pub mod stages;
pub mod state;
pub mod workspace;

// Re-export commonly used types
pub use agents::{AgentConfig, AgentRegistry};
pub use chat::{ChatMessage, ChatOutcome, ChatRole, ChatSession, ReplayChatSession};
pub use context::Context;
pub use controller::{PipelineController, RunOutcome};
pub use error::{FlowError, Result};
#[cfg(feature = "rig")]
pub use llm::GeminiModel;
pub use llm::LanguageModel;
pub use pipeline::{Pipeline, PipelineBuilder, PipelineOutput};
pub use record::{ChecklistItem, StructuredRecord};
pub use snapshot::{DocumentSnapshot, SnapshotStore, SnapshotSummary};
pub use stage::{Stage, StageResult};
pub use state::{AppState, Notice, PipelineStatus, Transition, WorkingState};
pub use workspace::{Workspace, WorkspaceView};
