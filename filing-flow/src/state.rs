//! Application state and the transitions that move it.
//!
//! Every change to the working document, the status flags, the chat history
//! or the snapshot store goes through [`AppState::apply`]. A transition that
//! is rejected leaves the state untouched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::{
    chat::ChatMessage,
    error::{FlowError, Result},
    record::{ChecklistItem, StructuredRecord},
    snapshot::{DocumentSnapshot, SnapshotStore},
};

pub const PIPELINE_FAILED_NOTICE: &str = "Pipeline failed. Check API Key configuration.";
pub const NO_DOCUMENT_NOTICE: &str = "Please upload/paste a document first.";

/// Readiness flags. They are independent, not a single enum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub input_ready: bool,
    pub parsing: bool,
    pub dashboard: bool,
    pub chat: bool,
}

impl PipelineStatus {
    /// Flags of a completed analysis.
    pub fn completed() -> Self {
        Self {
            input_ready: true,
            parsing: false,
            dashboard: true,
            chat: true,
        }
    }
}

/// User-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub detail: Option<String>,
    pub raised_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            message: message.into(),
            detail,
            raised_at: Utc::now(),
        }
    }
}

/// Volatile state of the document currently on screen.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkingState {
    pub raw_text: String,
    pub structured_record: Option<StructuredRecord>,
    pub summary_markdown: Option<String>,
    pub chat_history: Vec<ChatMessage>,
    pub status: PipelineStatus,
    pub chat_in_flight: bool,
    pub last_notice: Option<Notice>,
}

impl WorkingState {
    pub fn has_document(&self) -> bool {
        !self.raw_text.is_empty()
    }

    pub fn checklist(&self) -> Vec<ChecklistItem> {
        self.structured_record
            .clone()
            .unwrap_or_default()
            .checklist()
    }
}

/// Logical transitions of the application.
#[derive(Debug, Clone)]
pub enum Transition {
    InputChanged(String),
    RunStarted { raw_text: String },
    RunSucceeded {
        run: u64,
        record: StructuredRecord,
        summary: String,
    },
    RunFailed {
        run: u64,
        detail: String,
    },
    SnapshotSaved(DocumentSnapshot),
    SnapshotLoaded(usize),
    ChatMessageSent(String),
    ChatReplyReceived { turn: u64, text: String },
    ChatFailed { turn: u64, text: String },
}

impl Transition {
    fn name(&self) -> &'static str {
        match self {
            Transition::InputChanged(_) => "input_changed",
            Transition::RunStarted { .. } => "run_started",
            Transition::RunSucceeded { .. } => "run_succeeded",
            Transition::RunFailed { .. } => "run_failed",
            Transition::SnapshotSaved(_) => "snapshot_saved",
            Transition::SnapshotLoaded(_) => "snapshot_loaded",
            Transition::ChatMessageSent(_) => "chat_message_sent",
            Transition::ChatReplyReceived { .. } => "chat_reply_received",
            Transition::ChatFailed { .. } => "chat_failed",
        }
    }
}

/// Working document plus snapshot store.
///
/// `RunStarted` and `ChatMessageSent` each issue a ticket. Their completions
/// must quote it back; loading a snapshot voids both outstanding tickets, so
/// a reply that arrives after the load is rejected with
/// [`FlowError::Superseded`] instead of landing on the loaded document.
#[derive(Debug, Default, Clone)]
pub struct AppState {
    pub working: WorkingState,
    pub snapshots: SnapshotStore,
    pending_run: Option<u64>,
    pending_chat: Option<u64>,
    next_ticket: u64,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticket of the run in flight, if any.
    pub fn pending_run(&self) -> Option<u64> {
        self.pending_run
    }

    /// Ticket of the chat turn awaiting its reply, if any.
    pub fn pending_chat(&self) -> Option<u64> {
        self.pending_chat
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    pub fn apply(&mut self, transition: Transition) -> Result<()> {
        debug!(transition = transition.name(), "applying transition");

        match transition {
            Transition::InputChanged(text) => {
                let working = &mut self.working;
                if working.status.parsing {
                    return Err(FlowError::Busy("an analysis is in progress"));
                }
                working.status.input_ready = !text.is_empty();
                working.raw_text = text;
            }
            Transition::RunStarted { raw_text } => {
                if raw_text.trim().is_empty() {
                    return Err(FlowError::NoDocument);
                }
                if self.working.status.parsing {
                    return Err(FlowError::Busy("an analysis is already in progress"));
                }
                self.pending_run = Some(self.issue_ticket());
                let working = &mut self.working;
                working.raw_text = raw_text;
                working.status.parsing = true;
                working.structured_record = None;
                working.summary_markdown = None;
                working.last_notice = None;
            }
            Transition::RunSucceeded {
                run,
                record,
                summary,
            } => {
                self.settle_run(run)?;
                let working = &mut self.working;
                working.structured_record = Some(record);
                working.summary_markdown = Some(summary);
                working.status = PipelineStatus::completed();
            }
            Transition::RunFailed { run, detail } => {
                self.settle_run(run)?;
                let working = &mut self.working;
                working.status.parsing = false;
                working.last_notice = Some(Notice::new(PIPELINE_FAILED_NOTICE, Some(detail)));
            }
            Transition::SnapshotSaved(snapshot) => {
                self.snapshots.save(snapshot);
            }
            Transition::SnapshotLoaded(index) => {
                let snapshot = self
                    .snapshots
                    .get(index)
                    .cloned()
                    .ok_or(FlowError::SnapshotNotFound(index))?;
                self.snapshots.set_current(index)?;
                self.pending_run = None;
                self.pending_chat = None;

                let working = &mut self.working;
                working.raw_text = snapshot.raw_text;
                working.structured_record = Some(snapshot.structured_record);
                working.summary_markdown = Some(snapshot.summary_markdown);
                working.chat_history = snapshot.chat_history;
                working.status = PipelineStatus::completed();
                working.chat_in_flight = false;
            }
            Transition::ChatMessageSent(text) => {
                if !self.working.has_document() {
                    return Err(FlowError::NoDocument);
                }
                if self.working.chat_in_flight {
                    return Err(FlowError::Busy("a chat reply is still pending"));
                }
                self.pending_chat = Some(self.issue_ticket());
                self.working.chat_history.push(ChatMessage::user(text));
                self.working.chat_in_flight = true;
            }
            Transition::ChatReplyReceived { turn, text } | Transition::ChatFailed { turn, text } => {
                if self.pending_chat != Some(turn) {
                    return Err(FlowError::Superseded("chat reply"));
                }
                self.pending_chat = None;
                self.working.chat_history.push(ChatMessage::assistant(text));
                self.working.chat_in_flight = false;
            }
        }

        Ok(())
    }

    fn settle_run(&mut self, run: u64) -> Result<()> {
        if self.pending_run != Some(run) {
            return Err(FlowError::Superseded("run"));
        }
        self.pending_run = None;
        Ok(())
    }
}
