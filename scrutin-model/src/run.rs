use std::fmt;

use crate::ids::RunId;

/// Observable state of the per-project run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "state", rename_all = "snake_case"))]
pub enum RunState {
    #[default]
    Stopped,
    Running {
        owner: RunId,
    },
    /// Cancellation was requested; the owner still holds the status until
    /// it observes the request and stops.
    Cancelling {
        owner: RunId,
    },
}

impl RunState {
    pub fn owner(&self) -> Option<RunId> {
        match self {
            RunState::Stopped => None,
            RunState::Running { owner } | RunState::Cancelling { owner } => {
                Some(*owner)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(self, RunState::Stopped)
    }

    pub fn is_cancelling(&self) -> bool {
        matches!(self, RunState::Cancelling { .. })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Stopped => write!(f, "stopped"),
            RunState::Running { owner } => write!(f, "running ({owner})"),
            RunState::Cancelling { owner } => {
                write!(f, "cancelling ({owner})")
            }
        }
    }
}
