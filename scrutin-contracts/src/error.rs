use thiserror::Error;

/// Failures reported by collaborators the orchestration layer calls into.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The collaborator observed cancellation and stopped early. Never a
    /// failure from the run's point of view.
    #[error("operation cancelled")]
    Cancelled,

    #[error("engine failure: {0}")]
    Engine(String),

    #[error("exclusion filter failure: {0}")]
    Exclusion(String),

    #[error("finding store failure: {0}")]
    Store(String),

    #[error("document unavailable: {0}")]
    Document(String),
}

impl CollaboratorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CollaboratorError::Cancelled)
    }
}
