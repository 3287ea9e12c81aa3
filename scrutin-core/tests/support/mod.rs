#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use scrutin_contracts::{
    AnalysisCallback, AnalysisEngine, CollaboratorError, Document,
    DocumentSource, EngineOutcome, ExclusionFilter, FilesByUnit,
    RawFindingSink,
};
use scrutin_core::orchestration::Collaborators;
use scrutin_core::store::InMemoryFindingStore;
use scrutin_model::{
    FileRef, FindingsByFile, ProjectId, RawFinding, ScopeUnit, TextRange,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Groups files by their first path component; files listed in `excluded`
/// are rejected unless the run is forced.
pub struct DirectoryUnits {
    pub project: ProjectId,
    pub excluded: HashMap<FileRef, String>,
    pub failure: Option<String>,
}

impl DirectoryUnits {
    pub fn new(project: ProjectId) -> Self {
        Self {
            project,
            excluded: HashMap::new(),
            failure: None,
        }
    }

    pub fn exclude(mut self, file: &str, reason: &str) -> Self {
        self.excluded.insert(FileRef::from(file), reason.to_string());
        self
    }

    /// Every partition call fails with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }
}

impl ExclusionFilter for DirectoryUnits {
    fn partition(
        &self,
        files: &[FileRef],
        forced: bool,
        on_excluded: &mut dyn FnMut(&FileRef, &str),
    ) -> Result<FilesByUnit, CollaboratorError> {
        if let Some(message) = &self.failure {
            return Err(CollaboratorError::Exclusion(message.clone()));
        }
        let mut units = FilesByUnit::new();
        for file in files {
            if !forced && let Some(reason) = self.excluded.get(file) {
                on_excluded(file, reason);
                continue;
            }
            let name = file
                .path()
                .components()
                .next()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .unwrap_or_else(|| "root".to_string());
            units
                .entry(ScopeUnit::new(self.project, name))
                .or_default()
                .insert(file.clone());
        }
        Ok(units)
    }
}

/// Engine that replays canned findings per file.
#[derive(Default)]
pub struct ScriptedEngine {
    findings: HashMap<FileRef, Vec<RawFinding>>,
    failed: HashSet<FileRef>,
    failing_units: HashMap<String, String>,
    gate: Option<Arc<Semaphore>>,
    hang: bool,
    panic: bool,
    pub calls: Mutex<Vec<String>>,
    pub entered: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(mut self, raw: RawFinding) -> Self {
        if let Some(file) = raw.file.clone() {
            self.findings.entry(file).or_default().push(raw);
        }
        self
    }

    pub fn fail_file(mut self, file: &str) -> Self {
        self.failed.insert(FileRef::from(file));
        self
    }

    pub fn fail_unit(mut self, unit: &str, message: &str) -> Self {
        self.failing_units
            .insert(unit.to_string(), message.to_string());
        self
    }

    /// Every call waits for a permit before producing findings.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Every call blocks until cancelled.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Every call panics.
    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl AnalysisEngine for ScriptedEngine {
    async fn analyze(
        &self,
        unit: &ScopeUnit,
        files: &BTreeSet<FileRef>,
        sink: &dyn RawFindingSink,
        cancel: CancellationToken,
    ) -> Result<EngineOutcome, CollaboratorError> {
        self.calls.lock().push(unit.name.clone());
        self.entered.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            tokio::select! {
                _ = cancel.cancelled() => return Err(CollaboratorError::Cancelled),
                permit = gate.acquire() => {
                    permit
                        .map_err(|err| CollaboratorError::Engine(err.to_string()))?
                        .forget();
                }
            }
        }
        if self.panic {
            panic!("scripted engine panic in unit {}", unit.name);
        }
        if self.hang {
            cancel.cancelled().await;
            return Err(CollaboratorError::Cancelled);
        }

        for file in files {
            for raw in self.findings.get(file).into_iter().flatten() {
                sink.accept(raw.clone());
            }
        }
        if let Some(message) = self.failing_units.get(&unit.name) {
            return Err(CollaboratorError::Engine(message.clone()));
        }
        Ok(EngineOutcome::with_failures(
            files.iter().filter(|f| self.failed.contains(*f)).cloned(),
        ))
    }
}

/// Every file is valid and holds 50 short lines at stamp 1.
pub struct StaticDocuments;

impl DocumentSource for StaticDocuments {
    fn is_valid(&self, _file: &FileRef) -> bool {
        true
    }

    fn document(&self, _file: &FileRef) -> Option<Document> {
        let text: String = (1..=50).map(|n| format!("let v{n} = {n};\n")).collect();
        Some(Document::new(text, 1))
    }
}

#[derive(Default)]
pub struct RecordingCallback {
    pub successes: Mutex<Vec<BTreeSet<FileRef>>>,
    pub errors: Mutex<Vec<String>>,
    pub intermediates: Mutex<Vec<FindingsByFile>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn success_count(&self) -> usize {
        self.successes.lock().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }
}

impl AnalysisCallback for RecordingCallback {
    fn on_success(&self, failed_files: BTreeSet<FileRef>) {
        self.successes.lock().push(failed_files);
    }

    fn on_error(&self, error: &(dyn std::error::Error + Send + Sync + 'static)) {
        self.errors.lock().push(error.to_string());
    }

    fn on_intermediate_result(&self, findings: FindingsByFile) {
        self.intermediates.lock().push(findings);
    }
}

pub fn collaborators(
    exclusions: DirectoryUnits,
    engine: Arc<ScriptedEngine>,
    store: Arc<InMemoryFindingStore>,
) -> Collaborators {
    Collaborators {
        exclusions: Arc::new(exclusions),
        engine,
        store,
        documents: Arc::new(StaticDocuments),
    }
}

pub fn issue(rule: &str, file: &str, line: u32, message: &str) -> RawFinding {
    RawFinding::issue(
        rule,
        FileRef::from(file),
        message,
        Some(TextRange::line(line).expect("valid line")),
    )
}

pub fn files(paths: &[&str]) -> Vec<FileRef> {
    paths.iter().map(|p| FileRef::from(*p)).collect()
}

pub fn file_set(paths: &[&str]) -> BTreeSet<FileRef> {
    paths.iter().map(|p| FileRef::from(*p)).collect()
}

/// Polls `condition` until it holds or five seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
