use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use scrutin_contracts::AnalysisCallback;
use scrutin_model::{FileRef, ProjectId, RunId, ScopeUnit, TriggerType};
use tracing::debug;

use crate::error::{AnalysisError, Result};

/// A deferred run waiting for the project's run status to free up.
#[derive(Clone)]
pub struct QueuedJob {
    pub run_id: RunId,
    pub unit: ScopeUnit,
    pub files: BTreeSet<FileRef>,
    pub trigger: TriggerType,
    /// One entry per submission merged into this job, in submission order.
    pub callbacks: Vec<Arc<dyn AnalysisCallback>>,
    pub enqueued_at: DateTime<Utc>,
}

impl fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedJob")
            .field("run_id", &self.run_id)
            .field("unit", &self.unit)
            .field("file_count", &self.files.len())
            .field("trigger", &self.trigger)
            .field("callbacks", &self.callbacks.len())
            .field("enqueued_at", &self.enqueued_at)
            .finish()
    }
}

impl QueuedJob {
    pub fn new(
        unit: ScopeUnit,
        files: impl IntoIterator<Item = FileRef>,
        trigger: TriggerType,
        callback: Arc<dyn AnalysisCallback>,
    ) -> Self {
        Self {
            run_id: RunId::new(),
            unit,
            files: files.into_iter().collect(),
            trigger,
            callbacks: vec![callback],
            enqueued_at: Utc::now(),
        }
    }

    /// Folds a later submission for the same unit into this job. The queued
    /// job keeps its identity, trigger and position; files are unioned and
    /// callbacks appended.
    pub fn merged_with(self, later: QueuedJob) -> QueuedJob {
        let QueuedJob {
            run_id,
            unit,
            mut files,
            trigger,
            mut callbacks,
            enqueued_at,
        } = self;
        files.extend(later.files);
        callbacks.extend(later.callbacks);
        QueuedJob {
            run_id,
            unit,
            files,
            trigger,
            callbacks,
            enqueued_at,
        }
    }
}

/// Result of a successful enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended at `position` (0 = next to run).
    Queued { run_id: RunId, position: usize },
    /// Folded into the job already queued for the same unit.
    Merged { into: RunId },
}

impl EnqueueOutcome {
    pub fn run_id(&self) -> RunId {
        match self {
            EnqueueOutcome::Queued { run_id, .. } => *run_id,
            EnqueueOutcome::Merged { into } => *into,
        }
    }
}

/// Bounded FIFO of deferred jobs for one project.
///
/// Not synchronized; the manager guards it with the lock it holds around
/// run status claims.
#[derive(Debug)]
pub struct JobQueue {
    project: ProjectId,
    capacity: usize,
    jobs: VecDeque<QueuedJob>,
}

impl JobQueue {
    pub fn new(project: ProjectId, capacity: usize) -> Self {
        Self {
            project,
            capacity,
            jobs: VecDeque::with_capacity(capacity),
        }
    }

    pub fn enqueue(
        &mut self,
        job: QueuedJob,
        optimize: bool,
    ) -> Result<EnqueueOutcome> {
        if job.files.is_empty() {
            return Err(AnalysisError::InvalidJob(format!(
                "no files to analyze in {}",
                job.unit
            )));
        }
        if !job.unit.belongs_to(self.project) {
            return Err(AnalysisError::InvalidJob(format!(
                "scope unit {} belongs to another project",
                job.unit
            )));
        }

        if optimize
            && let Some(index) =
                self.jobs.iter().position(|queued| queued.unit == job.unit)
            && let Some(queued) = self.jobs.remove(index)
        {
            let into = queued.run_id;
            let merged = queued.merged_with(job);
            debug!(
                target: "analysis::queue",
                run_id = %into,
                unit = %merged.unit,
                file_count = merged.files.len(),
                "merged submission into queued job"
            );
            self.jobs.insert(index, merged);
            return Ok(EnqueueOutcome::Merged { into });
        }

        if self.jobs.len() >= self.capacity {
            return Err(AnalysisError::NoCapacity {
                capacity: self.capacity,
            });
        }

        let run_id = job.run_id;
        self.jobs.push_back(job);
        Ok(EnqueueOutcome::Queued {
            run_id,
            position: self.jobs.len() - 1,
        })
    }

    pub fn dequeue(&mut self) -> Option<QueuedJob> {
        self.jobs.pop_front()
    }

    /// Drops every pending job and returns them so callers can log what was
    /// discarded.
    pub fn clear(&mut self) -> Vec<QueuedJob> {
        self.jobs.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn project(&self) -> ProjectId {
        self.project
    }
}
