use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use scrutin_contracts::{
    AnalysisCallback, AnalysisEngine, CancelSignal, CollaboratorError,
    DocumentSource, ExclusionFilter, FilesByUnit, FindingStore, RawFindingSink,
};
use scrutin_model::{
    FileRef, FindingsByFile, LiveFinding, RawFinding, RunId, TriggerType,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{AnalysisError, Result};

use super::events::{RunEndKind, RunEvent, RunEventPublisher};
use super::reconcile::FindingReconciler;
use super::run_status::RunStatus;
use super::streamer::FindingStreamer;
use super::watchdog::CancellationBridge;

/// The collaborators one run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub exclusions: Arc<dyn ExclusionFilter>,
    pub engine: Arc<dyn AnalysisEngine>,
    pub store: Arc<dyn FindingStore>,
    pub documents: Arc<dyn DocumentSource>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Everything needed to start one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: RunId,
    pub files: Vec<FileRef>,
    pub trigger: TriggerType,
    /// Bypass user configured exclusions.
    pub forced: bool,
    /// Whether a user is waiting on this run; drives how failures surface.
    pub interactive: bool,
}

impl RunRequest {
    pub fn new(files: Vec<FileRef>, trigger: TriggerType) -> Self {
        Self {
            run_id: RunId::new(),
            files,
            trigger,
            forced: trigger.forces_analysis(),
            interactive: false,
        }
    }

    pub fn forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }
}

/// Who releases the run status once the run ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusRelease {
    /// The dispatcher releases it if this run owns it.
    OnFinish,
    /// The caller takes over, typically to hand it to the next queued run.
    ByCaller,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub findings: FindingsByFile,
    pub failed_files: BTreeSet<FileRef>,
    pub analyzed_files: usize,
    pub raw_finding_count: usize,
    pub rule_keys: BTreeSet<String>,
    pub elapsed: Duration,
    /// Introduction date given to findings first seen in this run.
    pub analysis_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunReport),
    Cancelled,
    Failed { message: String },
}

impl RunOutcome {
    pub fn end_kind(&self) -> RunEndKind {
        match self {
            RunOutcome::Completed(_) => RunEndKind::Completed,
            RunOutcome::Cancelled => RunEndKind::Cancelled,
            RunOutcome::Failed { .. } => RunEndKind::Failed,
        }
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Executes runs end to end: exclusion, history capture, per-unit engine
/// calls, reconciliation, streaming, finalization, and reporting.
pub struct RunDispatcher {
    collaborators: Collaborators,
    status: Arc<RunStatus>,
    events: Arc<dyn RunEventPublisher>,
    bridge: CancellationBridge,
    debounce: Duration,
}

impl fmt::Debug for RunDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunDispatcher")
            .field("status", &self.status)
            .field("bridge", &self.bridge)
            .field("debounce", &self.debounce)
            .finish()
    }
}

impl RunDispatcher {
    pub fn new(
        collaborators: Collaborators,
        status: Arc<RunStatus>,
        events: Arc<dyn RunEventPublisher>,
        bridge: CancellationBridge,
        debounce: Duration,
    ) -> Self {
        Self {
            collaborators,
            status,
            events,
            bridge,
            debounce,
        }
    }

    pub fn status(&self) -> &Arc<RunStatus> {
        &self.status
    }

    /// Runs `request` to completion. The callback receives exactly one of
    /// `on_success` or `on_error`, or nothing when the run is cancelled.
    /// Cleanup happens exactly once on every exit path, including when the
    /// returned future is dropped.
    pub async fn run(
        &self,
        request: RunRequest,
        callback: Arc<dyn AnalysisCallback>,
        signal: Arc<dyn CancelSignal>,
        token: CancellationToken,
        release: StatusRelease,
    ) -> RunOutcome {
        let run_id = request.run_id;
        let interactive = request.interactive;
        self.events.publish(RunEvent::Started {
            run_id,
            trigger: request.trigger,
            file_count: request.files.len(),
            interactive,
            at: Utc::now(),
        });
        info!(
            target: "analysis::run",
            %run_id,
            trigger = %request.trigger,
            file_count = request.files.len(),
            "Trigger: {}",
            request.trigger
        );

        let mut cleanup = RunCleanup {
            run_id,
            status: Arc::clone(&self.status),
            events: Arc::clone(&self.events),
            release,
            end: None,
        };
        let streamer = FindingStreamer::new(Arc::clone(&callback), self.debounce);

        let result = self
            .execute(&request, &streamer, &signal, &token)
            .await;
        streamer.close();

        let outcome = match result {
            Ok(report) => {
                callback.on_success(report.failed_files.clone());
                RunOutcome::Completed(report)
            }
            Err(err) if err.is_cancelled() => {
                info!(target: "analysis::run", %run_id, "Analysis canceled");
                RunOutcome::Cancelled
            }
            Err(err) => {
                error!(target: "analysis::run", %run_id, error = %err, "Error during analysis");
                callback.on_error(&err);
                let message = err.to_string();
                self.events.publish(RunEvent::Failed {
                    run_id,
                    message: message.clone(),
                    interactive,
                });
                RunOutcome::Failed { message }
            }
        };

        cleanup.end = Some(outcome.end_kind());
        drop(cleanup);
        outcome
    }

    fn cancel_requested(
        &self,
        run_id: RunId,
        token: &CancellationToken,
        signal: &dyn CancelSignal,
    ) -> bool {
        token.is_cancelled()
            || signal.is_cancelled()
            || self.status.is_cancel_requested_for(run_id)
    }

    fn check_cancelled(
        &self,
        run_id: RunId,
        token: &CancellationToken,
        signal: &dyn CancelSignal,
    ) -> Result<()> {
        if self.cancel_requested(run_id, token, signal) {
            // Propagate to anything derived from the run token.
            token.cancel();
            return Err(AnalysisError::Cancelled);
        }
        Ok(())
    }

    async fn execute(
        &self,
        request: &RunRequest,
        streamer: &FindingStreamer,
        signal: &Arc<dyn CancelSignal>,
        token: &CancellationToken,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let run_id = request.run_id;
        let Collaborators {
            exclusions,
            engine,
            store,
            documents,
        } = &self.collaborators;

        let mut excluded = Vec::new();
        let units = exclusions.partition(
            &request.files,
            request.forced,
            &mut |file, reason| {
                debug!(
                    target: "analysis::run",
                    file = %file,
                    %reason,
                    "Excluding file from analysis"
                );
                excluded.push(file.clone());
            },
        )?;
        if !excluded.is_empty() {
            store.clear(&excluded);
        }

        self.check_cancelled(run_id, token, signal.as_ref())?;

        let eligible: BTreeSet<FileRef> =
            units.values().flatten().cloned().collect();
        if eligible.is_empty() {
            info!(target: "analysis::run", %run_id, "No files to analyze");
            return Ok(RunReport {
                elapsed: started.elapsed(),
                analysis_date: Utc::now(),
                ..RunReport::default()
            });
        }

        let reconciler = FindingReconciler::new(Arc::clone(documents), Utc::now());
        for file in &eligible {
            let previous = store.previous_findings(file);
            let first_analysis = !store.was_analyzed(file);
            let stamp = documents.document(file).map(|doc| doc.stamp);
            reconciler.prepare(file.clone(), &previous, first_analysis, stamp);
        }

        let accumulator = RunAccumulator::default();
        let sink = RunSink {
            reconciler: &reconciler,
            streamer,
            accumulator: &accumulator,
        };
        let mut failed = BTreeSet::new();

        for (unit, files) in &units {
            if files.is_empty() {
                continue;
            }
            info!(
                target: "analysis::run",
                %run_id,
                unit = %unit,
                file_count = files.len(),
                "Analyzing {} file(s) in {}",
                files.len(),
                unit
            );

            let guard = self.bridge.arm(Arc::clone(signal), token);
            let engine_token = guard.engine_token();
            let result = tokio::select! {
                biased;
                _ = engine_token.cancelled() => Err(CollaboratorError::Cancelled),
                result = engine.analyze(unit, files, &sink, engine_token.clone()) => result,
            };
            let tripped = guard.is_tripped();
            drop(guard);

            match result {
                Ok(outcome) => failed.extend(
                    outcome
                        .failed_files
                        .into_iter()
                        .filter(|file| files.contains(file)),
                ),
                Err(err) if err.is_cancelled() || tripped => {
                    token.cancel();
                    return Err(AnalysisError::Cancelled);
                }
                Err(err) => {
                    warn!(
                        target: "analysis::run",
                        %run_id,
                        unit = %unit,
                        error = %err,
                        "analysis of scope unit failed"
                    );
                    failed.extend(files.iter().cloned());
                }
            }

            self.check_cancelled(run_id, token, signal.as_ref())?;
        }

        Ok(self.finalize(
            run_id,
            &units,
            &eligible,
            failed,
            &reconciler,
            accumulator,
            started,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        run_id: RunId,
        units: &FilesByUnit,
        eligible: &BTreeSet<FileRef>,
        failed: BTreeSet<FileRef>,
        reconciler: &FindingReconciler,
        accumulator: RunAccumulator,
        started: Instant,
    ) -> RunReport {
        let store = &self.collaborators.store;
        let RunAccumulator {
            tracked,
            raw_count,
            rule_keys,
        } = accumulator;

        let mut findings = FindingsByFile::default();
        for file in eligible {
            let file_findings = tracked
                .remove(file)
                .map(|(_, findings)| findings)
                .unwrap_or_default();

            if failed.contains(file) {
                debug!(
                    target: "analysis::run",
                    file = %file,
                    "Analysis did not complete, findings might not be accurate"
                );
                continue;
            }

            let resolved = reconciler.unmatched_previous(file).len();
            if resolved > 0 {
                debug!(
                    target: "analysis::run",
                    file = %file,
                    resolved,
                    "previous findings no longer reported"
                );
            }
            for finding in &file_findings {
                findings.push(finding.clone());
            }
            store.commit(file, file_findings);
            store.mark_analyzed(file);
        }

        if failed.len() < eligible.len() {
            let issues = findings.issue_count();
            let hotspots = findings.hotspot_count();
            info!(
                target: "analysis::run",
                %run_id,
                units = units.len(),
                issues,
                hotspots,
                "Found {} issue(s)",
                issues
            );
        }

        RunReport {
            findings,
            analyzed_files: eligible.len() - failed.len(),
            failed_files: failed,
            raw_finding_count: raw_count.into_inner(),
            rule_keys: rule_keys.into_inner(),
            elapsed: started.elapsed(),
            analysis_date: reconciler.analysis_date(),
        }
    }
}

/// Per-run accumulation of tracked findings, in engine emission order per
/// file.
#[derive(Default)]
struct RunAccumulator {
    tracked: DashMap<FileRef, Vec<LiveFinding>>,
    raw_count: AtomicUsize,
    rule_keys: Mutex<BTreeSet<String>>,
}

struct RunSink<'a> {
    reconciler: &'a FindingReconciler,
    streamer: &'a FindingStreamer,
    accumulator: &'a RunAccumulator,
}

impl RawFindingSink for RunSink<'_> {
    fn accept(&self, raw: RawFinding) {
        self.accumulator.raw_count.fetch_add(1, Ordering::Relaxed);
        self.accumulator
            .rule_keys
            .lock()
            .insert(raw.rule_key.clone());

        let Some(tracked) = self.reconciler.reconcile(raw) else {
            return;
        };
        self.accumulator
            .tracked
            .entry(tracked.file.clone())
            .or_default()
            .push(tracked.clone());
        self.streamer.record(tracked);
    }
}

/// Marks the run finished exactly once, whichever way `run` exits.
struct RunCleanup {
    run_id: RunId,
    status: Arc<RunStatus>,
    events: Arc<dyn RunEventPublisher>,
    release: StatusRelease,
    end: Option<RunEndKind>,
}

impl Drop for RunCleanup {
    fn drop(&mut self) {
        let end = self.end.unwrap_or(if std::thread::panicking() {
            RunEndKind::Failed
        } else {
            RunEndKind::Cancelled
        });
        if self.release == StatusRelease::OnFinish {
            self.status.stop_run(self.run_id);
        }
        debug!(target: "analysis::run", run_id = %self.run_id, ?end, "run finished");
        self.events.publish(RunEvent::Finished {
            run_id: self.run_id,
            end,
            at: Utc::now(),
        });
    }
}
