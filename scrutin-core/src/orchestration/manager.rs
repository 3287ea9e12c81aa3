use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use scrutin_contracts::{AnalysisCallback, CancelSignal, NeverCancelled};
use scrutin_model::{
    FileRef, FindingsByFile, ProjectId, RunId, ScopeUnit, TriggerType,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::{AnalysisError, Result};

use super::dispatcher::{
    Collaborators, RunDispatcher, RunOutcome, RunRequest, StatusRelease,
};
use super::event_bus::InProcRunEventBus;
use super::events::RunEvent;
use super::queue::{EnqueueOutcome, JobQueue, QueuedJob};
use super::run_status::{PendingStatusChange, RunStatus};
use super::watchdog::CancellationBridge;

/// Handle to a launched run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    token: CancellationToken,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Requests cancellation; the run observes it at its next check or
    /// abandons the in-flight engine call.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn outcome(self) -> RunOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => RunOutcome::Failed {
                message: "analysis task panicked".to_string(),
            },
            Err(_) => RunOutcome::Cancelled,
        }
    }
}

/// Result of [`AnalysisManager::submit_queued`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedSubmission {
    pub outcome: EnqueueOutcome,
    /// The job left the queue right away because no run was active.
    pub started: bool,
}

/// Forwards every notification to each callback merged into a queued job.
struct CallbackFanout(Vec<Arc<dyn AnalysisCallback>>);

impl AnalysisCallback for CallbackFanout {
    fn on_success(&self, failed_files: BTreeSet<FileRef>) {
        for callback in &self.0 {
            callback.on_success(failed_files.clone());
        }
    }

    fn on_error(&self, error: &(dyn std::error::Error + Send + Sync + 'static)) {
        for callback in &self.0 {
            callback.on_error(error);
        }
    }

    fn on_intermediate_result(&self, findings: FindingsByFile) {
        for callback in &self.0 {
            callback.on_intermediate_result(findings.clone());
        }
    }
}

struct ManagerInner {
    project: ProjectId,
    dispatcher: Arc<RunDispatcher>,
    status: Arc<RunStatus>,
    queue: Mutex<JobQueue>,
    events: Arc<InProcRunEventBus>,
    root: CancellationToken,
    active: DashMap<RunId, CancellationToken>,
}

/// Public entry point of the orchestration layer for one project.
///
/// Owns the run status and the job queue and decides how each submission
/// runs: in the background, in the foreground (only when no other
/// user visible run is active), or through the queue.
#[derive(Clone)]
pub struct AnalysisManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for AnalysisManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisManager")
            .field("project", &self.inner.project)
            .field("status", &self.inner.status.state())
            .field("queued", &self.inner.queue.lock().len())
            .field("active", &self.inner.active.len())
            .finish()
    }
}

impl AnalysisManager {
    /// Builds the manager for `project`. Fails when `config` does not
    /// validate.
    pub fn new(
        project: ProjectId,
        collaborators: Collaborators,
        config: &OrchestratorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let status = Arc::new(RunStatus::new());
        let events = Arc::new(InProcRunEventBus::new(config.events.channel_capacity));
        status.add_observer(events.clone());

        let dispatcher = Arc::new(RunDispatcher::new(
            collaborators,
            Arc::clone(&status),
            events.clone(),
            CancellationBridge::new(config.watchdog.poll_interval()),
            config.streaming.debounce(),
        ));

        Ok(Self {
            inner: Arc::new(ManagerInner {
                project,
                dispatcher,
                status,
                queue: Mutex::new(JobQueue::new(project, config.queue.capacity)),
                events,
                root: CancellationToken::new(),
                active: DashMap::new(),
            }),
        })
    }

    pub fn project(&self) -> ProjectId {
        self.inner.project
    }

    pub fn status(&self) -> &Arc<RunStatus> {
        &self.inner.status
    }

    pub fn queued_jobs(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.inner.events.subscribe()
    }

    /// Starts a run without consulting the run status. Background runs
    /// never block user visible runs and report failures passively.
    pub fn submit_background(
        &self,
        files: Vec<FileRef>,
        trigger: TriggerType,
        callback: Arc<dyn AnalysisCallback>,
        signal: Arc<dyn CancelSignal>,
    ) -> RunHandle {
        let request = RunRequest::new(files, trigger);
        self.inner
            .launch(request, callback, signal, StatusRelease::OnFinish)
    }

    /// Starts a user visible run if no other one is active; otherwise logs
    /// and returns `None`.
    pub fn submit_foreground(
        &self,
        files: Vec<FileRef>,
        trigger: TriggerType,
        modal: bool,
        callback: Arc<dyn AnalysisCallback>,
        signal: Arc<dyn CancelSignal>,
    ) -> Option<RunHandle> {
        if files.is_empty() {
            info!(target: "analysis::run", %trigger, "No files to analyze");
            return None;
        }
        if self.inner.root.is_cancelled() {
            warn!(target: "analysis::run", "analysis manager is shut down");
            return None;
        }

        let request = RunRequest::new(files, trigger).interactive(true);
        let claimed = {
            let _queue = self.inner.queue.lock();
            self.inner.status.try_run_deferred(request.run_id)
        };
        let Some(change) = claimed else {
            info!(target: "analysis::run", %trigger, "another analysis is already running");
            return None;
        };
        self.inner.status.publish(change);

        debug!(target: "analysis::run", run_id = %request.run_id, modal, "starting foreground analysis");
        Some(self.inner.launch(
            request,
            callback,
            signal,
            StatusRelease::OnFinish,
        ))
    }

    /// Queues a run for `unit`, merging into an already queued job for the
    /// same unit. The queue is drained one job at a time while the run
    /// status is held.
    pub fn submit_queued(
        &self,
        unit: ScopeUnit,
        files: Vec<FileRef>,
        trigger: TriggerType,
        callback: Arc<dyn AnalysisCallback>,
    ) -> Result<QueuedSubmission> {
        if self.inner.root.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let job = QueuedJob::new(unit, files, trigger, callback);
        let (outcome, next) = {
            let mut queue = self.inner.queue.lock();
            let outcome = queue.enqueue(job, true).inspect_err(|err| {
                if let AnalysisError::NoCapacity { capacity } = err {
                    warn!(
                        target: "analysis::queue",
                        capacity,
                        "Analysis queue full, dropping request"
                    );
                }
            })?;
            (outcome, self.inner.claim_next(&mut queue))
        };

        let started = next
            .as_ref()
            .is_some_and(|(job, _)| job.run_id == outcome.run_id());
        if let Some((job, change)) = next {
            self.inner.status.publish(change);
            self.inner.spawn_queued(job);
        }
        Ok(QueuedSubmission { outcome, started })
    }

    /// Asks the active user visible run to stop.
    pub fn cancel_active(&self) -> bool {
        let Some(owner) = self.inner.status.owner() else {
            return false;
        };
        let requested = self.inner.status.cancel();
        if let Some(token) = self.inner.active.get(&owner) {
            token.cancel();
        }
        requested
    }

    /// Cancels every run, drops queued jobs, and frees the run status.
    pub fn shutdown(&self) {
        self.inner.root.cancel();
        let dropped = self.inner.queue.lock().clear();
        if !dropped.is_empty() {
            info!(
                target: "analysis::queue",
                dropped = dropped.len(),
                "discarding queued analyses on shutdown"
            );
        }
        self.inner.status.force_stop();
    }
}

impl ManagerInner {
    /// Dequeues the next job if the status is free and claims the status
    /// for it. Must be called with the queue lock held; the returned change
    /// is published after that lock is released.
    fn claim_next(
        &self,
        queue: &mut JobQueue,
    ) -> Option<(QueuedJob, PendingStatusChange)> {
        if self.status.is_running() {
            return None;
        }
        let job = queue.dequeue()?;
        if let Some(change) = self.status.try_run_deferred(job.run_id) {
            Some((job, change))
        } else {
            warn!(target: "analysis::queue", run_id = %job.run_id, "could not claim run status for queued job");
            None
        }
    }

    fn drain_queue(self: &Arc<Self>) {
        let next = {
            let mut queue = self.queue.lock();
            self.claim_next(&mut queue)
        };
        if let Some((job, change)) = next {
            self.status.publish(change);
            self.spawn_queued(job);
        }
    }

    fn spawn_queued(self: &Arc<Self>, job: QueuedJob) {
        let QueuedJob {
            run_id,
            unit,
            files,
            trigger,
            callbacks,
            ..
        } = job;
        debug!(
            target: "analysis::queue",
            %run_id,
            unit = %unit,
            file_count = files.len(),
            "starting queued analysis"
        );

        let request = RunRequest {
            run_id,
            files: files.into_iter().collect(),
            trigger,
            forced: trigger.forces_analysis(),
            interactive: trigger.is_user_initiated(),
        };
        let callback: Arc<dyn AnalysisCallback> = Arc::new(CallbackFanout(callbacks));
        let handle = self.launch(
            request,
            callback,
            Arc::new(NeverCancelled),
            StatusRelease::ByCaller,
        );

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let _ = handle.outcome().await;
            inner.hand_over(run_id);
        });
    }

    /// Passes the status from the finished queued run to the next queued
    /// job, or releases it when the queue is empty.
    fn hand_over(self: &Arc<Self>, finished: RunId) {
        let (next, change) = {
            let mut queue = self.queue.lock();
            match queue.dequeue() {
                Some(next) => {
                    let change = self
                        .status
                        .transfer_deferred(finished, next.run_id)
                        .or_else(|| self.status.try_run_deferred(next.run_id));
                    if change.is_some() {
                        (Some(next), change)
                    } else {
                        warn!(
                            target: "analysis::queue",
                            run_id = %next.run_id,
                            "run status taken, dropping queued analysis"
                        );
                        (None, None)
                    }
                }
                None => (None, self.status.stop_run_deferred(finished)),
            }
        };
        if let Some(change) = change {
            self.status.publish(change);
        }
        if let Some(job) = next {
            self.spawn_queued(job);
        }
    }

    fn launch(
        self: &Arc<Self>,
        request: RunRequest,
        callback: Arc<dyn AnalysisCallback>,
        signal: Arc<dyn CancelSignal>,
        release: StatusRelease,
    ) -> RunHandle {
        let run_id = request.run_id;
        let token = self.root.child_token();
        self.active.insert(run_id, token.clone());

        let span = debug_span!("analysis_run", %run_id, trigger = %request.trigger);
        let run = {
            let dispatcher = Arc::clone(&self.dispatcher);
            let callback = Arc::clone(&callback);
            let token = token.clone();
            tokio::spawn(
                async move {
                    dispatcher
                        .run(request, callback, signal, token, release)
                        .await
                }
                .instrument(span),
            )
        };

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(err) if err.is_panic() => {
                    error!(target: "analysis::run", %run_id, "analysis task panicked");
                    let err = AnalysisError::Internal("analysis task panicked".to_string());
                    callback.on_error(&err);
                    RunOutcome::Failed {
                        message: err.to_string(),
                    }
                }
                Err(_) => RunOutcome::Cancelled,
            };
            inner.active.remove(&run_id);
            if release == StatusRelease::OnFinish {
                inner.drain_queue();
            }
            outcome
        });

        RunHandle {
            run_id,
            token,
            task,
        }
    }
}
