//! Pipeline controller: drives one run of the pipeline against the workspace.
//!
//! A run moves the state through `RunStarted`, then either `RunSucceeded`
//! followed by an automatic snapshot, or `RunFailed`. A run overtaken by a
//! snapshot load ends as [`RunOutcome::Superseded`]. Model failures never
//! propagate past [`PipelineController::run`]; they come back as
//! [`RunOutcome::Failed`] carrying the user-visible notice.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    error::FlowError,
    llm::LanguageModel,
    pipeline::Pipeline,
    snapshot::DocumentSnapshot,
    state::{Notice, PIPELINE_FAILED_NOTICE, Transition},
    workspace::{Workspace, commit_snapshot},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Blank input: nothing changed and the model was not called.
    Skipped,
    /// Another run is in flight.
    Busy,
    Completed {
        snapshot_index: usize,
        label: String,
        degraded: bool,
    },
    Failed(Notice),
    /// A snapshot was loaded while the run was in flight; its result was
    /// dropped and the working state was left alone.
    Superseded,
}

pub struct PipelineController {
    pipeline: Arc<Pipeline>,
    model: Arc<dyn LanguageModel>,
    workspace: Arc<Workspace>,
}

impl PipelineController {
    pub fn new(
        pipeline: Arc<Pipeline>,
        model: Arc<dyn LanguageModel>,
        workspace: Arc<Workspace>,
    ) -> Self {
        Self {
            pipeline,
            model,
            workspace,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn run(&self, document_text: &str) -> RunOutcome {
        if document_text.trim().is_empty() {
            return RunOutcome::Skipped;
        }

        let started = self
            .workspace
            .with_state(|state| {
                state.apply(Transition::RunStarted {
                    raw_text: document_text.to_string(),
                })?;
                state
                    .pending_run()
                    .ok_or_else(|| FlowError::ContextError("run started without a ticket".to_string()))
            })
            .await;
        let run = match started {
            Ok(run) => run,
            Err(FlowError::Busy(reason)) => {
                warn!("ignoring overlapping run: {}", reason);
                return RunOutcome::Busy;
            }
            Err(FlowError::NoDocument) => return RunOutcome::Skipped,
            Err(e) => {
                error!("could not start run: {}", e);
                return RunOutcome::Failed(Notice::new(PIPELINE_FAILED_NOTICE, Some(e.to_string())));
            }
        };

        info!(run, chars = document_text.chars().count(), "pipeline run started");
        let output = match self.pipeline.execute(self.model.as_ref(), document_text).await {
            Ok(output) => output,
            Err(e) => {
                error!("pipeline run failed: {}", e);
                return self.fail(run, e.to_string()).await;
            }
        };

        let snapshot = DocumentSnapshot::new(
            output.record.clone(),
            output.summary.clone(),
            document_text,
            Vec::new(),
        );
        let label = snapshot.label.clone();

        // Completion and auto-save share one lock so a load cannot slip between them.
        let committed = self
            .workspace
            .with_state(|state| {
                state.apply(Transition::RunSucceeded {
                    run,
                    record: output.record,
                    summary: output.summary,
                })?;
                commit_snapshot(state, snapshot)
            })
            .await;

        match committed {
            Ok(snapshot_index) => {
                info!(run, snapshot_index, label = %label, degraded = output.degraded, "pipeline run completed");
                RunOutcome::Completed {
                    snapshot_index,
                    label,
                    degraded: output.degraded,
                }
            }
            Err(FlowError::Superseded(_)) => {
                info!(run, "discarding run result after a snapshot load");
                RunOutcome::Superseded
            }
            Err(e) => {
                error!("auto-save failed: {}", e);
                self.fail(run, e.to_string()).await
            }
        }
    }

    /// Runs over the current working input.
    pub async fn run_current(&self) -> RunOutcome {
        let raw_text = self.workspace.view().await.working.raw_text;
        self.run(&raw_text).await
    }

    async fn fail(&self, run: u64, detail: String) -> RunOutcome {
        let applied = self
            .workspace
            .with_state(|state| {
                state
                    .apply(Transition::RunFailed {
                        run,
                        detail: detail.clone(),
                    })
                    .map(|()| state.working.last_notice.clone())
            })
            .await;
        match applied {
            Ok(notice) => RunOutcome::Failed(
                notice.unwrap_or_else(|| Notice::new(PIPELINE_FAILED_NOTICE, Some(detail))),
            ),
            Err(_) => {
                info!(run, "discarding run failure after a snapshot load");
                RunOutcome::Superseded
            }
        }
    }
}
