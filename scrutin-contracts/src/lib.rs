//! Trait surfaces that describe the collaborators of a scrutin analysis run.

pub mod callback;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod store;

/// Frequently used trait combinators for engines, hosts, and tests.
pub mod prelude {
    pub use super::callback::{
        AnalysisCallback, CancelSignal, NeverCancelled, NoopAnalysisCallback,
        StatusObserver,
    };
    pub use super::engine::{AnalysisEngine, EngineOutcome, RawFindingSink};
    pub use super::error::CollaboratorError;
    pub use super::exclusion::{ExclusionFilter, FilesByUnit};
    pub use super::store::{Document, DocumentSource, FindingStore};
}

pub use prelude::*;
