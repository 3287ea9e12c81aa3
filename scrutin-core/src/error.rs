use scrutin_contracts::CollaboratorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Analysis queue is full (capacity {capacity})")]
    NoCapacity { capacity: usize },

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Cancellation travels as an error internally but is never reported as
    /// a failure.
    pub fn is_cancelled(&self) -> bool {
        match self {
            AnalysisError::Cancelled => true,
            AnalysisError::Collaborator(err) => err.is_cancelled(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
