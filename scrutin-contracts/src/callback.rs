use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use scrutin_model::{FileRef, FindingsByFile, RunState};
use tokio_util::sync::CancellationToken;

/// Caller supplied sink for the outcome of one run.
pub trait AnalysisCallback: Send + Sync {
    /// The run completed. `failed_files` lists files whose results may be
    /// inaccurate; it is empty on full success.
    fn on_success(&self, failed_files: BTreeSet<FileRef>);

    /// The run failed for a reason other than cancellation.
    fn on_error(&self, error: &(dyn std::error::Error + Send + Sync + 'static));

    /// Partial results published while the run is still going.
    fn on_intermediate_result(&self, findings: FindingsByFile);
}

/// Callback that ignores every notification.
pub struct NoopAnalysisCallback;

impl AnalysisCallback for NoopAnalysisCallback {
    fn on_success(&self, _failed_files: BTreeSet<FileRef>) {}

    fn on_error(&self, _error: &(dyn std::error::Error + Send + Sync + 'static)) {}

    fn on_intermediate_result(&self, _findings: FindingsByFile) {}
}

impl fmt::Debug for NoopAnalysisCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoopAnalysisCallback")
    }
}

/// Observer hook for run status transitions.
pub trait StatusObserver: Send + Sync {
    fn on_status_changed(&self, state: RunState);
}

/// External cancellation signal, typically the host's progress indicator.
pub trait CancelSignal: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

/// Signal for runs without a host indicator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancelled;

impl CancelSignal for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl CancelSignal for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl CancelSignal for CancellationToken {
    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }
}
