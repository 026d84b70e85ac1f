use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    chat::ChatMessage,
    error::{FlowError, Result},
    record::StructuredRecord,
};

/// Frozen capture of one completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Local wall-clock time for display only; ordering is by position.
    pub timestamp: String,
    pub label: String,
    pub raw_text: String,
    pub structured_record: StructuredRecord,
    pub summary_markdown: String,
    pub chat_history: Vec<ChatMessage>,
}

impl DocumentSnapshot {
    pub fn new(
        record: StructuredRecord,
        summary: impl Into<String>,
        raw_text: impl Into<String>,
        chat_history: Vec<ChatMessage>,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            created_at,
            label: record.label(),
            raw_text: raw_text.into(),
            structured_record: record,
            summary_markdown: summary.into(),
            chat_history,
        }
    }
}

/// Listing entry for a stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub index: usize,
    pub id: String,
    pub label: String,
    pub timestamp: String,
}

/// Append-only sequence of snapshots with a cursor on the current one.
///
/// The cursor is either `None` or a valid position; nothing removes entries,
/// so a position handed out once stays valid.
#[derive(Debug, Default, Clone)]
pub struct SnapshotStore {
    snapshots: Vec<DocumentSnapshot>,
    current: Option<usize>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends and points the cursor at the new entry.
    pub fn save(&mut self, snapshot: DocumentSnapshot) -> usize {
        self.snapshots.push(snapshot);
        let index = self.snapshots.len() - 1;
        self.current = Some(index);
        index
    }

    pub fn get(&self, index: usize) -> Option<&DocumentSnapshot> {
        self.snapshots.get(index)
    }

    pub fn set_current(&mut self, index: usize) -> Result<()> {
        if index >= self.snapshots.len() {
            return Err(FlowError::SnapshotNotFound(index));
        }
        self.current = Some(index);
        Ok(())
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn summaries(&self) -> Vec<SnapshotSummary> {
        self.snapshots
            .iter()
            .enumerate()
            .map(|(index, s)| SnapshotSummary {
                index,
                id: s.id.clone(),
                label: s.label.clone(),
                timestamp: s.timestamp.clone(),
            })
            .collect()
    }
}
