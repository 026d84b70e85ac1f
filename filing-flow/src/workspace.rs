use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    chat::ChatMessage,
    error::Result,
    record::{ChecklistItem, StructuredRecord},
    snapshot::{DocumentSnapshot, SnapshotSummary},
    state::{AppState, Transition, WorkingState},
};

/// Point-in-time copy of the working state for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceView {
    pub working: WorkingState,
    pub checklist: Vec<ChecklistItem>,
    pub current_snapshot: Option<usize>,
    pub snapshot_count: usize,
}

/// Shared container around [`AppState`].
///
/// The lock is never held across a model call: callers apply a transition,
/// release, await the service, then apply the follow-up transition.
#[derive(Debug, Default)]
pub struct Workspace {
    state: Mutex<AppState>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: AppState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub async fn apply(&self, transition: Transition) -> Result<()> {
        self.state.lock().await.apply(transition)
    }

    /// Runs `f` with exclusive access, for read-then-transition sequences.
    pub async fn with_state<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut state = self.state.lock().await;
        f(&mut *state)
    }

    pub async fn view(&self) -> WorkspaceView {
        let state = self.state.lock().await;
        WorkspaceView {
            working: state.working.clone(),
            checklist: state.working.checklist(),
            current_snapshot: state.snapshots.current_index(),
            snapshot_count: state.snapshots.len(),
        }
    }

    pub async fn set_input(&self, text: impl Into<String>) -> Result<()> {
        self.apply(Transition::InputChanged(text.into())).await
    }

    /// Appends a snapshot with an empty chat history and returns its position.
    pub async fn save(
        &self,
        record: StructuredRecord,
        summary: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Result<usize> {
        self.save_snapshot(DocumentSnapshot::new(record, summary, raw_text, Vec::new()))
            .await
    }

    /// Freezes the working document, including a copy of the live chat.
    pub async fn save_current(&self) -> Result<usize> {
        self.with_state(|state| {
            let working = &state.working;
            let snapshot = DocumentSnapshot::new(
                working.structured_record.clone().unwrap_or_default(),
                working.summary_markdown.clone().unwrap_or_default(),
                working.raw_text.clone(),
                working.chat_history.clone(),
            );
            commit_snapshot(state, snapshot)
        })
        .await
    }

    pub async fn save_snapshot(&self, snapshot: DocumentSnapshot) -> Result<usize> {
        self.with_state(|state| commit_snapshot(state, snapshot))
            .await
    }

    pub async fn load(&self, index: usize) -> Result<()> {
        self.apply(Transition::SnapshotLoaded(index)).await?;
        info!(index, "snapshot loaded");
        Ok(())
    }

    pub async fn snapshots(&self) -> Vec<SnapshotSummary> {
        self.state.lock().await.snapshots.summaries()
    }

    pub async fn snapshot(&self, index: usize) -> Option<DocumentSnapshot> {
        self.state.lock().await.snapshots.get(index).cloned()
    }

    pub async fn chat_history(&self) -> Vec<ChatMessage> {
        self.state.lock().await.working.chat_history.clone()
    }
}

pub(crate) fn commit_snapshot(state: &mut AppState, snapshot: DocumentSnapshot) -> Result<usize> {
    let label = snapshot.label.clone();
    state.apply(Transition::SnapshotSaved(snapshot))?;
    let index = state.snapshots.len() - 1;
    info!(index, label = %label, "snapshot saved");
    Ok(index)
}
