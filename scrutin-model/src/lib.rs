//! Core data model definitions shared across scrutin crates.
#![allow(missing_docs)]

pub mod error;
pub mod files;
pub mod finding;
pub mod ids;
pub mod prelude;
pub mod run;
pub mod trigger;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use files::{FileRef, ScopeUnit};
pub use finding::{
    FindingKind, FindingSnapshot, FindingsByFile, LiveFinding, Origin,
    RawFinding, Severity, TextRange,
};
pub use ids::{FindingId, ProjectId, RunId};
pub use run::RunState;
pub use trigger::TriggerType;
