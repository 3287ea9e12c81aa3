use std::sync::Arc;

use scrutin_model::{FileRef, FindingSnapshot, LiveFinding};

/// The live finding store observers read from.
pub trait FindingStore: Send + Sync {
    /// Findings currently known for `file`.
    fn previous_findings(&self, file: &FileRef) -> FindingSnapshot;

    /// Whether `file` completed at least one analysis before.
    fn was_analyzed(&self, file: &FileRef) -> bool;

    /// Drops every finding of the given files (excluded or deleted files).
    fn clear(&self, files: &[FileRef]);

    /// Replaces the live findings of `file`. Previous findings absent from
    /// `findings` are considered resolved.
    fn commit(&self, file: &FileRef, findings: Vec<LiveFinding>);

    fn mark_analyzed(&self, file: &FileRef);
}

/// Text of a file as seen by the host editor, plus a modification stamp
/// that changes whenever the text does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: Arc<str>,
    pub stamp: u64,
}

impl Document {
    pub fn new(text: impl Into<Arc<str>>, stamp: u64) -> Self {
        Self {
            text: text.into(),
            stamp,
        }
    }

    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }
}

/// Host access to file validity and current document content.
pub trait DocumentSource: Send + Sync {
    /// `false` once a file was deleted or otherwise invalidated.
    fn is_valid(&self, file: &FileRef) -> bool;

    fn document(&self, file: &FileRef) -> Option<Document>;
}
