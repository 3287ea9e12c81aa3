//! Orchestration focused snapshot of the types surface.
//! Prefer importing from this module instead of individual tree nodes when
//! wiring engines, stores, or presentation layers.

pub use super::files::{FileRef, ScopeUnit};
pub use super::finding::{
    FindingKind, FindingSnapshot, FindingsByFile, LiveFinding, Origin,
    RawFinding, Severity, TextRange,
};
pub use super::ids::{FindingId, ProjectId, RunId};
pub use super::run::RunState;
pub use super::trigger::TriggerType;
