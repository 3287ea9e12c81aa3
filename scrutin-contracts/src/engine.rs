use std::collections::BTreeSet;

use async_trait::async_trait;
use scrutin_model::{FileRef, RawFinding, ScopeUnit};
use tokio_util::sync::CancellationToken;

use crate::error::CollaboratorError;

/// Receives raw findings one at a time, in the order the engine produces
/// them.
pub trait RawFindingSink: Send + Sync {
    fn accept(&self, raw: RawFinding);
}

/// Summary returned by the engine once a scope unit has been analyzed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutcome {
    /// Files the engine could not analyze completely. Their findings may be
    /// inaccurate.
    pub failed_files: BTreeSet<FileRef>,
}

impl EngineOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn with_failures(failed_files: impl IntoIterator<Item = FileRef>) -> Self {
        Self {
            failed_files: failed_files.into_iter().collect(),
        }
    }
}

/// The rule engine that turns file content into raw findings.
///
/// Implementations are expected to poll `cancel` and return
/// [`CollaboratorError::Cancelled`] when it fires; the caller also stops
/// awaiting the call once the token is cancelled.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn analyze(
        &self,
        unit: &ScopeUnit,
        files: &BTreeSet<FileRef>,
        sink: &dyn RawFindingSink,
        cancel: CancellationToken,
    ) -> Result<EngineOutcome, CollaboratorError>;
}
