use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use scrutin_contracts::AnalysisCallback;
use scrutin_model::{FindingsByFile, LiveFinding};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{trace, warn};

#[derive(Default)]
struct StreamState {
    accumulated: FindingsByFile,
    pending: Option<JoinHandle<()>>,
    closed: bool,
    publications: usize,
}

struct StreamInner {
    callback: Arc<dyn AnalysisCallback>,
    debounce: Duration,
    state: Mutex<StreamState>,
}

/// Accumulates tracked findings during a run and publishes the accumulated
/// set to the run's callback at most once per debounce interval.
///
/// The first finding recorded while no publication is pending arms a single
/// timer; later findings ride along with it. Every publication carries
/// everything accumulated since the run started.
pub struct FindingStreamer {
    inner: Arc<StreamInner>,
    runtime: Option<Handle>,
}

impl fmt::Debug for FindingStreamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("FindingStreamer")
            .field("debounce", &self.inner.debounce)
            .field("accumulated", &state.accumulated.total())
            .field("pending", &state.pending.is_some())
            .field("closed", &state.closed)
            .finish()
    }
}

impl FindingStreamer {
    pub fn new(callback: Arc<dyn AnalysisCallback>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                callback,
                debounce,
                state: Mutex::new(StreamState::default()),
            }),
            runtime: Handle::try_current().ok(),
        }
    }

    pub fn record(&self, finding: LiveFinding) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.accumulated.push(finding);
        if state.pending.is_some() {
            return;
        }

        let Some(runtime) = self.runtime.as_ref() else {
            warn!(target: "analysis::stream", "no runtime available, intermediate results disabled");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let deadline = Instant::now() + inner.debounce;
        state.pending = Some(runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            inner.publish();
        }));
    }

    /// Cancels any pending publication and refuses further scheduling.
    pub fn close(&self) {
        let pending = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.pending.take()
        };
        if let Some(handle) = pending {
            handle.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Number of intermediate results delivered so far.
    pub fn publications(&self) -> usize {
        self.inner.state.lock().publications
    }
}

impl StreamInner {
    fn publish(&self) {
        let snapshot = {
            let mut state = self.state.lock();
            state.pending = None;
            if state.closed {
                return;
            }
            state.publications += 1;
            state.accumulated.clone()
        };
        trace!(
            target: "analysis::stream",
            issues = snapshot.issue_count(),
            hotspots = snapshot.hotspot_count(),
            "publishing intermediate results"
        );
        self.callback.on_intermediate_result(snapshot);
    }
}

impl Drop for FindingStreamer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrutin_model::{FileRef, FindingId, FindingKind, Origin, Severity};
    use std::collections::BTreeSet;

    #[derive(Default)]
    struct Collect(Mutex<Vec<FindingsByFile>>);

    impl AnalysisCallback for Collect {
        fn on_success(&self, _failed_files: BTreeSet<FileRef>) {}
        fn on_error(&self, _error: &(dyn std::error::Error + Send + Sync + 'static)) {}
        fn on_intermediate_result(&self, findings: FindingsByFile) {
            self.0.lock().push(findings);
        }
    }

    fn finding(path: &str, kind: FindingKind) -> LiveFinding {
        LiveFinding {
            id: FindingId::new(),
            file: FileRef::from(path),
            rule_key: "R1".to_string(),
            kind,
            severity: Severity::Minor,
            message: "m".to_string(),
            text_range: None,
            range_hash: None,
            line_hash: None,
            introduction_date: None,
            resolved: false,
            on_new_code: false,
            origin: Origin::Local,
            server_key: None,
        }
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_publication() {
        let collect = Arc::new(Collect::default());
        let streamer = FindingStreamer::new(collect.clone(), Duration::from_millis(300));

        for n in 0..5 {
            streamer.record(finding(&format!("f{n}.rs"), FindingKind::Issue));
            tokio::time::advance(Duration::from_millis(20)).await;
        }
        tokio::time::advance(Duration::from_millis(300)).await;
        settle().await;

        let published = collect.0.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].issue_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn publications_are_cumulative_and_split_by_kind() {
        let collect = Arc::new(Collect::default());
        let streamer = FindingStreamer::new(collect.clone(), Duration::from_millis(300));

        streamer.record(finding("a.rs", FindingKind::Issue));
        tokio::time::advance(Duration::from_millis(301)).await;
        settle().await;

        streamer.record(finding("a.rs", FindingKind::SecurityHotspot));
        tokio::time::advance(Duration::from_millis(301)).await;
        settle().await;

        let published = collect.0.lock();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].total(), 1);
        assert_eq!(published[1].issue_count(), 1);
        assert_eq!(published[1].hotspot_count(), 1);
        assert_eq!(streamer.publications(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_pending_publication() {
        let collect = Arc::new(Collect::default());
        let streamer = FindingStreamer::new(collect.clone(), Duration::from_millis(300));

        streamer.record(finding("a.rs", FindingKind::Issue));
        streamer.close();
        streamer.record(finding("b.rs", FindingKind::Issue));
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;

        assert!(collect.0.lock().is_empty());
        assert!(streamer.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_closes() {
        let collect = Arc::new(Collect::default());
        {
            let streamer =
                FindingStreamer::new(collect.clone(), Duration::from_millis(300));
            streamer.record(finding("a.rs", FindingKind::Issue));
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(collect.0.lock().is_empty());
    }
}
