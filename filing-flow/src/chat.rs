//! Turn-based chat grounded in the current document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    error::FlowError,
    llm::LanguageModel,
    state::{NO_DOCUMENT_NOTICE, Transition, WorkingState},
    workspace::Workspace,
};

/// Characters of the raw filing included in every chat request.
pub const CONTEXT_EXCERPT_CHARS: usize = 10_000;
pub const CHAT_ERROR_REPLY: &str =
    "Error: Could not connect to the model service. Please check your API key.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Result of one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Replied(String),
    /// The service failed; the error text was appended as the assistant turn.
    Failed(String),
    /// Nothing was appended; the notice asks for a document first.
    NoDocument(&'static str),
    Busy,
    EmptyMessage,
    /// A snapshot was loaded before the reply arrived; the reply was dropped.
    Superseded,
}

/// Context block sent with every turn: device name, summary and a bounded
/// excerpt of the raw filing.
pub fn build_context(working: &WorkingState) -> String {
    let device = working
        .structured_record
        .as_ref()
        .and_then(|r| r.device_name())
        .unwrap_or("Unknown");
    let summary = working.summary_markdown.as_deref().unwrap_or("");
    let excerpt: String = working
        .raw_text
        .chars()
        .take(CONTEXT_EXCERPT_CHARS)
        .collect();

    format!("Device: {device}\nSummary: {summary}\nFull Text Snippet: {excerpt}...")
}

#[async_trait]
pub trait ChatSession: Send + Sync {
    async fn send(&self, user_text: &str) -> ChatOutcome;
}

/// Chat session that rebuilds the whole context and replays the full history
/// on every turn. The model service keeps no conversation state.
pub struct ReplayChatSession {
    model: Arc<dyn LanguageModel>,
    workspace: Arc<Workspace>,
}

impl ReplayChatSession {
    pub fn new(model: Arc<dyn LanguageModel>, workspace: Arc<Workspace>) -> Self {
        Self { model, workspace }
    }
}

#[async_trait]
impl ChatSession for ReplayChatSession {
    async fn send(&self, user_text: &str) -> ChatOutcome {
        if user_text.trim().is_empty() {
            return ChatOutcome::EmptyMessage;
        }

        // The user's turn is recorded before the call so it survives a failure.
        let prepared = self
            .workspace
            .with_state(|state| -> Result<_, FlowError> {
                let prior = state.working.chat_history.clone();
                let context = build_context(&state.working);
                state.apply(Transition::ChatMessageSent(user_text.to_string()))?;
                let turn = state
                    .pending_chat()
                    .ok_or_else(|| FlowError::ContextError("chat turn without a ticket".to_string()))?;
                Ok((turn, prior, context))
            })
            .await;

        let (turn, history, context) = match prepared {
            Ok(prepared) => prepared,
            Err(FlowError::NoDocument) => return ChatOutcome::NoDocument(NO_DOCUMENT_NOTICE),
            Err(e) => {
                warn!("chat turn rejected: {}", e);
                return ChatOutcome::Busy;
            }
        };

        info!(history = history.len(), "sending chat turn");
        let (transition, outcome) = match self.model.run_chat(&history, user_text, &context).await
        {
            Ok(reply) => (
                Transition::ChatReplyReceived {
                    turn,
                    text: reply.clone(),
                },
                ChatOutcome::Replied(reply),
            ),
            Err(e) => {
                warn!("chat turn failed: {}", e);
                (
                    Transition::ChatFailed {
                        turn,
                        text: CHAT_ERROR_REPLY.to_string(),
                    },
                    ChatOutcome::Failed(CHAT_ERROR_REPLY.to_string()),
                )
            }
        };

        match self.workspace.apply(transition).await {
            Ok(()) => outcome,
            Err(FlowError::Superseded(_)) => {
                info!(turn, "dropping chat reply after a snapshot load");
                ChatOutcome::Superseded
            }
            Err(e) => {
                warn!("failed to record chat reply: {}", e);
                outcome
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::{Reply, ScriptedModel};
    use crate::record::StructuredRecord;
    use crate::state::AppState;
    use tokio::sync::Notify;

    async fn workspace_with_document(raw_text: &str) -> Arc<Workspace> {
        let mut state = AppState::new();
        state
            .apply(Transition::RunStarted {
                raw_text: raw_text.to_string(),
            })
            .unwrap();
        let run = state.pending_run().unwrap();
        state
            .apply(Transition::RunSucceeded {
                run,
                record: StructuredRecord::parse(r#"{"device_name":"AcmeScan 3000"}"#).unwrap(),
                summary: "## Summary\nA scanner.".to_string(),
            })
            .unwrap();
        Arc::new(Workspace::from_state(state))
    }

    #[tokio::test]
    async fn test_send_appends_user_then_assistant() {
        let workspace = workspace_with_document("Device: AcmeScan 3000").await;
        let model = Arc::new(ScriptedModel::new(vec![
            Reply::text("It scans."),
            Reply::text("K123456."),
        ]));
        let session = ReplayChatSession::new(model.clone(), workspace.clone());

        assert_eq!(
            session.send("What does it do?").await,
            ChatOutcome::Replied("It scans.".to_string())
        );
        session.send("Predicate?").await;

        let history = workspace.view().await.working.chat_history;
        assert_eq!(
            history,
            vec![
                ChatMessage::user("What does it do?"),
                ChatMessage::assistant("It scans."),
                ChatMessage::user("Predicate?"),
                ChatMessage::assistant("K123456."),
            ]
        );

        // Only prior turns are replayed; the new message travels separately.
        let calls = model.chat_calls();
        assert!(calls[0].history.is_empty());
        assert_eq!(calls[1].history.len(), 2);
        assert_eq!(calls[1].new_message, "Predicate?");
        assert!(calls[1].context.starts_with("Device: AcmeScan 3000\nSummary: ## Summary"));
    }

    #[tokio::test]
    async fn test_send_without_document_contacts_nobody() {
        let workspace = Arc::new(Workspace::new());
        let model = Arc::new(ScriptedModel::new(vec![Reply::text("unused")]));
        let session = ReplayChatSession::new(model.clone(), workspace.clone());

        assert_eq!(
            session.send("Hello?").await,
            ChatOutcome::NoDocument(NO_DOCUMENT_NOTICE)
        );
        assert_eq!(model.call_count(), 0);
        assert!(workspace.view().await.working.chat_history.is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_user_message_and_appends_error() {
        let workspace = workspace_with_document("Device: AcmeScan 3000").await;
        let model = Arc::new(ScriptedModel::new(vec![Reply::fail("401 unauthorized")]));
        let session = ReplayChatSession::new(model, workspace.clone());

        let outcome = session.send("Indications?").await;
        assert_eq!(outcome, ChatOutcome::Failed(CHAT_ERROR_REPLY.to_string()));

        let working = workspace.view().await.working;
        assert_eq!(
            working.chat_history,
            vec![
                ChatMessage::user("Indications?"),
                ChatMessage::assistant(CHAT_ERROR_REPLY),
            ]
        );
        assert!(!working.chat_in_flight);
    }

    #[tokio::test]
    async fn test_blank_message_is_ignored() {
        let workspace = workspace_with_document("text").await;
        let model = Arc::new(ScriptedModel::new(Vec::new()));
        let session = ReplayChatSession::new(model.clone(), workspace);
        assert_eq!(session.send("   ").await, ChatOutcome::EmptyMessage);
        assert_eq!(model.call_count(), 0);
    }

    #[test]
    fn test_context_excerpt_is_bounded() {
        let working = WorkingState {
            raw_text: "é".repeat(CONTEXT_EXCERPT_CHARS + 500),
            ..Default::default()
        };
        let context = build_context(&working);
        assert!(context.starts_with("Device: Unknown\nSummary: \nFull Text Snippet: "));
        let excerpt = context
            .trim_start_matches("Device: Unknown\nSummary: \nFull Text Snippet: ")
            .trim_end_matches("...");
        assert_eq!(excerpt.chars().count(), CONTEXT_EXCERPT_CHARS);
    }

    #[tokio::test]
    async fn test_reply_landing_after_load_is_dropped() {
        let workspace = workspace_with_document("Device: AcmeScan 3000").await;
        workspace
            .save(StructuredRecord::new(), "saved summary", "saved text")
            .await
            .unwrap();
        let gate = Arc::new(Notify::new());
        let model = Arc::new(ScriptedModel::new(vec![
            Reply::held(&gate, "late answer"),
            Reply::text("fresh answer"),
        ]));
        let session = Arc::new(ReplayChatSession::new(model.clone(), workspace.clone()));

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.send("Still there?").await }
        });
        while model.call_count() == 0 {
            tokio::task::yield_now().await;
        }

        workspace.load(0).await.unwrap();
        gate.notify_one();
        assert_eq!(pending.await.unwrap(), ChatOutcome::Superseded);

        let working = workspace.view().await.working;
        assert!(working.chat_history.is_empty());
        assert!(!working.chat_in_flight);

        assert_eq!(
            session.send("New question?").await,
            ChatOutcome::Replied("fresh answer".to_string())
        );
        assert_eq!(
            workspace.chat_history().await,
            vec![
                ChatMessage::user("New question?"),
                ChatMessage::assistant("fresh answer"),
            ]
        );
    }
}
