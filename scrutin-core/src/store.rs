use std::collections::{BTreeMap, BTreeSet};

use dashmap::{DashMap, DashSet};
use scrutin_contracts::FindingStore;
use scrutin_model::{FileRef, FindingSnapshot, FindingsByFile, LiveFinding};

/// Live finding store held in memory, keyed by file.
#[derive(Debug, Default)]
pub struct InMemoryFindingStore {
    findings: DashMap<FileRef, FindingSnapshot>,
    analyzed: DashSet<FileRef>,
}

impl InMemoryFindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds history for `file`, as if a previous run had committed it.
    pub fn seed(&self, file: FileRef, findings: Vec<LiveFinding>) {
        self.analyzed.insert(file.clone());
        self.findings.insert(file, FindingSnapshot::new(findings));
    }

    pub fn findings_for(&self, file: &FileRef) -> Vec<LiveFinding> {
        self.findings
            .get(file)
            .map(|snapshot| snapshot.findings().to_vec())
            .unwrap_or_default()
    }

    pub fn analyzed_files(&self) -> BTreeSet<FileRef> {
        self.analyzed.iter().map(|file| file.key().clone()).collect()
    }

    /// Everything currently live, split by kind and ordered by file.
    pub fn snapshot(&self) -> FindingsByFile {
        let ordered: BTreeMap<FileRef, FindingSnapshot> = self
            .findings
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let mut all = FindingsByFile::default();
        for finding in ordered.values().flat_map(|s| s.findings().iter()) {
            all.push(finding.clone());
        }
        all
    }
}

impl FindingStore for InMemoryFindingStore {
    fn previous_findings(&self, file: &FileRef) -> FindingSnapshot {
        self.findings
            .get(file)
            .map(|snapshot| snapshot.clone())
            .unwrap_or_else(FindingSnapshot::empty)
    }

    fn was_analyzed(&self, file: &FileRef) -> bool {
        self.analyzed.contains(file)
    }

    fn clear(&self, files: &[FileRef]) {
        for file in files {
            self.findings.remove(file);
        }
    }

    fn commit(&self, file: &FileRef, findings: Vec<LiveFinding>) {
        if findings.is_empty() {
            self.findings.remove(file);
        } else {
            self.findings
                .insert(file.clone(), FindingSnapshot::new(findings));
        }
    }

    fn mark_analyzed(&self, file: &FileRef) {
        self.analyzed.insert(file.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrutin_model::{FindingId, FindingKind, Origin, Severity};

    fn finding(path: &str, kind: FindingKind) -> LiveFinding {
        LiveFinding {
            id: FindingId::new(),
            file: FileRef::from(path),
            rule_key: "R1".to_string(),
            kind,
            severity: Severity::Info,
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

    #[test]
    fn commit_replaces_previous_findings() {
        let store = InMemoryFindingStore::new();
        let file = FileRef::from("a.rs");
        store.seed(file.clone(), vec![finding("a.rs", FindingKind::Issue)]);
        assert!(store.was_analyzed(&file));

        let replacement = finding("a.rs", FindingKind::SecurityHotspot);
        store.commit(&file, vec![replacement.clone()]);
        assert_eq!(store.findings_for(&file), vec![replacement]);

        store.commit(&file, Vec::new());
        assert!(store.previous_findings(&file).is_empty());
    }

    #[test]
    fn clear_keeps_analyzed_flag() {
        let store = InMemoryFindingStore::new();
        let file = FileRef::from("a.rs");
        store.seed(file.clone(), vec![finding("a.rs", FindingKind::Issue)]);

        store.clear(std::slice::from_ref(&file));
        assert!(store.previous_findings(&file).is_empty());
        assert!(store.was_analyzed(&file));
    }

    #[test]
    fn snapshot_splits_by_kind() {
        let store = InMemoryFindingStore::new();
        store.seed(FileRef::from("a.rs"), vec![finding("a.rs", FindingKind::Issue)]);
        store.seed(
            FileRef::from("b.rs"),
            vec![finding("b.rs", FindingKind::SecurityHotspot)],
        );

        let all = store.snapshot();
        assert_eq!(all.issue_count(), 1);
        assert_eq!(all.hotspot_count(), 1);
    }
}
