use chrono::{DateTime, Utc};
use scrutin_model::{RunId, RunState, TriggerType};
use serde::{Deserialize, Serialize};

/// How a run ended, as reported on the event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEndKind {
    Completed,
    Cancelled,
    Failed,
}

/// Lifecycle notifications emitted by the orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        run_id: RunId,
        trigger: TriggerType,
        file_count: usize,
        interactive: bool,
        at: DateTime<Utc>,
    },
    Finished {
        run_id: RunId,
        end: RunEndKind,
        at: DateTime<Utc>,
    },
    /// An unexpected failure. Hosts show a blocking dialog when
    /// `interactive` is set and a passive notification otherwise.
    Failed {
        run_id: RunId,
        message: String,
        interactive: bool,
    },
    StatusChanged {
        state: RunState,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            RunEvent::Started { run_id, .. }
            | RunEvent::Finished { run_id, .. }
            | RunEvent::Failed { run_id, .. } => Some(*run_id),
            RunEvent::StatusChanged { state } => state.owner(),
        }
    }
}

/// Publisher seam used by the dispatcher; the in-process bus is the only
/// production implementation.
pub trait RunEventPublisher: Send + Sync {
    fn publish(&self, event: RunEvent);
}
