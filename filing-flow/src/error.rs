use thiserror::Error;

/// Errors raised inside the analysis flow.
///
/// Collaborator failures (`MissingCredential`, `ModelService`) never escape a
/// pipeline run or a chat turn; the orchestration boundaries turn them into
/// outcomes. The remaining variants guard state transitions.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("model credential is missing: {0}")]
    MissingCredential(String),

    #[error("model service error: {0}")]
    ModelService(String),

    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    #[error("context error: {0}")]
    ContextError(String),

    #[error("busy: {0}")]
    Busy(&'static str),

    /// A completion arrived for a run or chat turn that a snapshot load
    /// already abandoned.
    #[error("superseded {0}")]
    Superseded(&'static str),

    #[error("no document has been loaded or analyzed")]
    NoDocument,

    #[error("snapshot {0} not found")]
    SnapshotNotFound(usize),

    #[error("invalid agent configuration: {0}")]
    InvalidAgent(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
