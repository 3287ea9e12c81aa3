use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use scrutin_contracts::{CollaboratorError, Document, DocumentSource};
use scrutin_model::{
    FileRef, FindingId, FindingSnapshot, LiveFinding, Origin, RawFinding,
    TextRange,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, trace};

use super::tracking::FileTracking;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("no location match for {file}: {reason}")]
    NoLocationMatch { file: FileRef, reason: String },

    #[error("malformed finding: {0}")]
    Malformed(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

struct FileState {
    tracking: FileTracking,
    first_analysis: bool,
    stamp: Option<u64>,
}

/// Per-run matcher that turns raw engine findings into tracked findings.
///
/// Each file is prepared once before the engine runs with the snapshot of
/// findings known at that time; every raw finding then either continues one
/// of those (keeping its id and history) or starts a new one.
pub struct FindingReconciler {
    documents: Arc<dyn DocumentSource>,
    analysis_date: DateTime<Utc>,
    files: DashMap<FileRef, FileState>,
}

impl fmt::Debug for FindingReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindingReconciler")
            .field("analysis_date", &self.analysis_date)
            .field("files", &self.files.len())
            .finish()
    }
}

impl FindingReconciler {
    pub fn new(
        documents: Arc<dyn DocumentSource>,
        analysis_date: DateTime<Utc>,
    ) -> Self {
        Self {
            documents,
            analysis_date,
            files: DashMap::new(),
        }
    }

    /// Date stamped on findings that appear in a previously analyzed file.
    pub fn analysis_date(&self) -> DateTime<Utc> {
        self.analysis_date
    }

    /// Captures the history of `file`. `stamp` is the document stamp at run
    /// start; locations reported against a different stamp are dropped.
    pub fn prepare(
        &self,
        file: FileRef,
        previous: &FindingSnapshot,
        first_analysis: bool,
        stamp: Option<u64>,
    ) {
        self.files.insert(
            file,
            FileState {
                tracking: FileTracking::new(previous.findings().iter().cloned()),
                first_analysis,
                stamp,
            },
        );
    }

    /// Reconciles one raw finding. Failures are logged and isolated to this
    /// finding.
    pub fn reconcile(&self, raw: RawFinding) -> Option<LiveFinding> {
        match self.try_reconcile(raw) {
            Ok(tracked) => tracked,
            Err(ReconcileError::NoLocationMatch { file, reason }) => {
                debug!(
                    target: "analysis::tracking",
                    file = %file,
                    %reason,
                    "dropping finding without location match"
                );
                None
            }
            Err(err) => {
                error!(target: "analysis::tracking", error = %err, "error processing finding");
                None
            }
        }
    }

    pub fn try_reconcile(
        &self,
        raw: RawFinding,
    ) -> Result<Option<LiveFinding>, ReconcileError> {
        let Some(file) = raw.file.clone() else {
            trace!(target: "analysis::tracking", rule = %raw.rule_key, "skipping project level finding");
            return Ok(None);
        };
        raw.validate()
            .map_err(|err| ReconcileError::Malformed(err.to_string()))?;

        if !self.documents.is_valid(&file) {
            trace!(target: "analysis::tracking", file = %file, "skipping finding on invalidated file");
            return Ok(None);
        }

        let mut state = self.files.get_mut(&file).ok_or_else(|| {
            ReconcileError::Malformed(format!("{file} is not part of this run"))
        })?;

        let (range_hash, line_hash) = match &raw.text_range {
            Some(range) => {
                let document = self.documents.document(&file).ok_or_else(|| {
                    CollaboratorError::Document(file.to_string())
                })?;
                if let Some(stamp) = state.stamp
                    && stamp != document.stamp
                {
                    return Err(ReconcileError::NoLocationMatch {
                        file,
                        reason: "document changed during analysis".to_string(),
                    });
                }
                let (range_text, line_text) = locate(&document, range)
                    .map_err(|reason| ReconcileError::NoLocationMatch {
                        file: file.clone(),
                        reason,
                    })?;
                (Some(content_hash(&range_text)), Some(content_hash(&line_text)))
            }
            None => (None, None),
        };

        let mut tracked = LiveFinding {
            id: FindingId::new(),
            file,
            rule_key: raw.rule_key,
            kind: raw.kind,
            severity: raw.severity,
            message: raw.message,
            text_range: raw.text_range,
            range_hash,
            line_hash,
            introduction_date: None,
            resolved: false,
            on_new_code: raw.on_new_code,
            origin: Origin::Local,
            server_key: None,
        };

        if state.first_analysis {
            return Ok(Some(tracked));
        }

        match state.tracking.take_match(&tracked) {
            Some((strategy, previous)) => {
                trace!(
                    target: "analysis::tracking",
                    id = %previous.id,
                    ?strategy,
                    "matched previous finding"
                );
                tracked.id = previous.id;
                tracked.introduction_date = previous.introduction_date;
                tracked.resolved = previous.resolved;
                tracked.server_key = previous.server_key;
                tracked.origin = previous.origin;
            }
            None => tracked.introduction_date = Some(self.analysis_date),
        }
        Ok(Some(tracked))
    }

    /// Previous findings of `file` nothing matched so far.
    pub fn unmatched_previous(&self, file: &FileRef) -> Vec<LiveFinding> {
        self.files
            .get(file)
            .map(|state| state.tracking.unmatched().to_vec())
            .unwrap_or_default()
    }
}

/// SHA-256 (hex) of `text` with every whitespace character removed, so
/// reformatting does not break matching.
pub fn content_hash(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::encode(Sha256::digest(stripped.as_bytes()))
}

/// Text covered by `range` and the full text of its start line.
fn locate(
    document: &Document,
    range: &TextRange,
) -> Result<(String, String), String> {
    let lines: Vec<&str> = document.text.lines().collect();
    let start = range.start_line as usize;
    let end = range.end_line as usize;
    if start == 0 || end > lines.len() {
        return Err(format!(
            "range {start}..{end} outside document of {} line(s)",
            lines.len()
        ));
    }

    let start_line = lines[start - 1];
    let end_line = lines[end - 1];
    let start_offset = range.start_line_offset.unwrap_or(0) as usize;
    let end_offset = range
        .end_line_offset
        .map(|offset| offset as usize)
        .unwrap_or_else(|| end_line.chars().count());

    if start_offset > start_line.chars().count()
        || end_offset > end_line.chars().count()
        || (start == end && end_offset < start_offset)
    {
        return Err(format!("offsets outside lines {start}..{end}"));
    }

    let mut text = String::new();
    if start == end {
        text.extend(
            start_line
                .chars()
                .skip(start_offset)
                .take(end_offset - start_offset),
        );
    } else {
        text.extend(start_line.chars().skip(start_offset));
        for line in &lines[start..end - 1] {
            text.push('\n');
            text.push_str(line);
        }
        text.push('\n');
        text.extend(end_line.chars().take(end_offset));
    }
    Ok((text, start_line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct Documents {
        docs: RwLock<HashMap<FileRef, Document>>,
        invalid: RwLock<HashSet<FileRef>>,
    }

    impl Documents {
        fn with(file: &FileRef, text: &str, stamp: u64) -> Arc<Self> {
            let docs = Arc::new(Self::default());
            docs.docs
                .write()
                .insert(file.clone(), Document::new(text, stamp));
            docs
        }
    }

    impl DocumentSource for Documents {
        fn is_valid(&self, file: &FileRef) -> bool {
            !self.invalid.read().contains(file)
        }

        fn document(&self, file: &FileRef) -> Option<Document> {
            self.docs.read().get(file).cloned()
        }
    }

    const SOURCE: &str = "fn main() {\n    let x = 1;\n    println!(\"{x}\");\n}\n";

    fn line(n: u32) -> Option<TextRange> {
        Some(TextRange::line(n).unwrap())
    }

    #[test]
    fn first_analysis_creates_new_findings_without_date() {
        let file = FileRef::from("main.rs");
        let reconciler =
            FindingReconciler::new(Documents::with(&file, SOURCE, 1), Utc::now());
        reconciler.prepare(file.clone(), &FindingSnapshot::empty(), true, Some(1));

        let tracked = reconciler
            .reconcile(RawFinding::issue("R1", file.clone(), "unused", line(2)))
            .unwrap();
        assert_eq!(tracked.file, file);
        assert!(tracked.introduction_date.is_none());
        assert_eq!(tracked.range_hash.as_deref(), Some(content_hash("let x = 1;").as_str()));
    }

    #[test]
    fn rerun_carries_identity_forward() {
        let file = FileRef::from("main.rs");
        let docs = Documents::with(&file, SOURCE, 1);
        let date = Utc::now();

        let first = FindingReconciler::new(docs.clone(), date);
        first.prepare(file.clone(), &FindingSnapshot::empty(), true, Some(1));
        let mut previous = first
            .reconcile(RawFinding::issue("R1", file.clone(), "unused", line(2)))
            .unwrap();
        previous.server_key = Some("AX-9".to_string());

        let second = FindingReconciler::new(docs, date);
        second.prepare(
            file.clone(),
            &FindingSnapshot::new(vec![previous.clone()]),
            false,
            Some(1),
        );
        let again = second
            .reconcile(RawFinding::issue("R1", file.clone(), "unused", line(2)))
            .unwrap();
        let fresh = second
            .reconcile(RawFinding::issue("R2", file.clone(), "print", line(3)))
            .unwrap();

        assert_eq!(again.id, previous.id);
        assert_eq!(again.server_key.as_deref(), Some("AX-9"));
        assert_ne!(fresh.id, previous.id);
        assert_eq!(fresh.introduction_date, Some(date));
        assert!(second.unmatched_previous(&file).is_empty());
    }

    #[test]
    fn bad_findings_are_isolated() {
        let file = FileRef::from("main.rs");
        let reconciler =
            FindingReconciler::new(Documents::with(&file, SOURCE, 1), Utc::now());
        reconciler.prepare(file.clone(), &FindingSnapshot::empty(), true, Some(1));

        let out_of_range = RawFinding::issue("R1", file.clone(), "m", line(40));
        let blank_rule = RawFinding::issue("  ", file.clone(), "m", line(1));
        let mut project_level = RawFinding::issue("R1", file.clone(), "m", None);
        project_level.file = None;
        let good = RawFinding::issue("R1", file.clone(), "m", line(1));

        assert!(reconciler.reconcile(out_of_range).is_none());
        assert!(reconciler.reconcile(blank_rule).is_none());
        assert!(reconciler.reconcile(project_level).is_none());
        assert!(reconciler.reconcile(good).is_some());
    }

    #[test]
    fn out_of_range_is_a_location_miss() {
        let file = FileRef::from("main.rs");
        let reconciler =
            FindingReconciler::new(Documents::with(&file, SOURCE, 1), Utc::now());
        reconciler.prepare(file.clone(), &FindingSnapshot::empty(), true, Some(1));

        let err = reconciler
            .try_reconcile(RawFinding::issue("R1", file, "m", line(9)))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NoLocationMatch { .. }));
    }

    #[test]
    fn stamp_change_drops_located_findings() {
        let file = FileRef::from("main.rs");
        let docs = Documents::with(&file, SOURCE, 2);
        let reconciler = FindingReconciler::new(docs, Utc::now());
        reconciler.prepare(file.clone(), &FindingSnapshot::empty(), true, Some(1));

        let err = reconciler
            .try_reconcile(RawFinding::issue("R1", file.clone(), "m", line(1)))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NoLocationMatch { .. }));

        let file_level = RawFinding::issue("R1", file, "m", None);
        assert!(reconciler.reconcile(file_level).is_some());
    }

    #[test]
    fn invalidated_files_are_skipped() {
        let file = FileRef::from("main.rs");
        let docs = Documents::with(&file, SOURCE, 1);
        docs.invalid.write().insert(file.clone());
        let reconciler = FindingReconciler::new(docs, Utc::now());
        reconciler.prepare(file.clone(), &FindingSnapshot::empty(), true, Some(1));

        let outcome = reconciler
            .try_reconcile(RawFinding::issue("R1", file, "m", line(1)))
            .unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn hash_ignores_whitespace() {
        assert_eq!(content_hash("let x = 1;"), content_hash("let  x=1;\n"));
        assert_ne!(content_hash("let x = 1;"), content_hash("let y = 1;"));
    }

    #[test]
    fn multi_line_range_uses_offsets() {
        let document = Document::new(SOURCE, 0);
        let range = TextRange::new(2, Some(4), 3, Some(12)).unwrap();
        let (text, line) = locate(&document, &range).unwrap();
        assert_eq!(text, "let x = 1;\n    println!");
        assert_eq!(line, "    let x = 1;");
    }
}
