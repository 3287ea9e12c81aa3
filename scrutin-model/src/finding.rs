use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{ModelError, Result};
use crate::files::FileRef;
use crate::ids::FindingId;

/// Location of a finding inside a file. Lines are 1-based; offsets are
/// 0-based character columns and may be absent for line-level findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextRange {
    pub start_line: u32,
    pub start_line_offset: Option<u32>,
    pub end_line: u32,
    pub end_line_offset: Option<u32>,
}

impl TextRange {
    pub fn new(
        start_line: u32,
        start_line_offset: Option<u32>,
        end_line: u32,
        end_line_offset: Option<u32>,
    ) -> Result<Self> {
        if start_line == 0 {
            return Err(ModelError::InvalidRange(
                "lines are 1-based".to_string(),
            ));
        }
        if end_line < start_line {
            return Err(ModelError::InvalidRange(format!(
                "end line {end_line} before start line {start_line}"
            )));
        }
        Ok(Self {
            start_line,
            start_line_offset,
            end_line,
            end_line_offset,
        })
    }

    /// Whole-line range without column information.
    pub fn line(line: u32) -> Result<Self> {
        Self::new(line, None, line, None)
    }

    /// Re-validates a range that may have been built field by field by an
    /// engine adapter.
    pub fn validate(&self) -> Result<()> {
        Self::new(
            self.start_line,
            self.start_line_offset,
            self.end_line,
            self.end_line_offset,
        )
        .map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FindingKind {
    Issue,
    SecurityHotspot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Severity {
    Info,
    Minor,
    Major,
    Critical,
    Blocker,
}

/// Whether a finding was first produced locally or imported from a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Origin {
    #[default]
    Local,
    Server,
}

/// A finding as emitted by the engine, before any tracking.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawFinding {
    pub rule_key: String,
    /// `None` for project-level findings that are not attached to a file.
    pub file: Option<FileRef>,
    pub kind: FindingKind,
    pub severity: Severity,
    pub message: String,
    pub text_range: Option<TextRange>,
    pub on_new_code: bool,
}

impl RawFinding {
    pub fn issue(
        rule_key: impl Into<String>,
        file: FileRef,
        message: impl Into<String>,
        text_range: Option<TextRange>,
    ) -> Self {
        Self {
            rule_key: rule_key.into(),
            file: Some(file),
            kind: FindingKind::Issue,
            severity: Severity::Major,
            message: message.into(),
            text_range,
            on_new_code: true,
        }
    }

    pub fn hotspot(
        rule_key: impl Into<String>,
        file: FileRef,
        message: impl Into<String>,
        text_range: Option<TextRange>,
    ) -> Self {
        Self {
            kind: FindingKind::SecurityHotspot,
            ..Self::issue(rule_key, file, message, text_range)
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Structural checks an engine adapter is expected to satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.rule_key.trim().is_empty() {
            return Err(ModelError::InvalidFinding(
                "rule key is blank".to_string(),
            ));
        }
        if let Some(range) = &self.text_range {
            range.validate()?;
        }
        Ok(())
    }
}

/// A tracked finding, carrying identity and history across runs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LiveFinding {
    pub id: FindingId,
    pub file: FileRef,
    pub rule_key: String,
    pub kind: FindingKind,
    pub severity: Severity,
    pub message: String,
    pub text_range: Option<TextRange>,
    /// Content fingerprint of the text covered by `text_range`.
    pub range_hash: Option<String>,
    /// Content fingerprint of the first line of `text_range`.
    pub line_hash: Option<String>,
    /// `None` when the file was analyzed for the first time and the real
    /// introduction date is unknown.
    pub introduction_date: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub on_new_code: bool,
    pub origin: Origin,
    pub server_key: Option<String>,
}

impl LiveFinding {
    pub fn line(&self) -> Option<u32> {
        self.text_range.map(|range| range.start_line)
    }

    pub fn is_hotspot(&self) -> bool {
        self.kind == FindingKind::SecurityHotspot
    }
}

/// Immutable set of findings known for one file before a run started.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindingSnapshot {
    findings: Arc<[LiveFinding]>,
}

impl FindingSnapshot {
    pub fn new(findings: Vec<LiveFinding>) -> Self {
        Self {
            findings: findings.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn findings(&self) -> &[LiveFinding] {
        &self.findings
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Findings of one run grouped by file; issues and hotspots are kept apart
/// the way observers display them.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FindingsByFile {
    pub issues: BTreeMap<FileRef, Vec<LiveFinding>>,
    pub hotspots: BTreeMap<FileRef, Vec<LiveFinding>>,
}

impl FindingsByFile {
    pub fn push(&mut self, finding: LiveFinding) {
        let target = if finding.is_hotspot() {
            &mut self.hotspots
        } else {
            &mut self.issues
        };
        target.entry(finding.file.clone()).or_default().push(finding);
    }

    pub fn issue_count(&self) -> usize {
        self.issues.values().map(Vec::len).sum()
    }

    pub fn hotspot_count(&self) -> usize {
        self.hotspots.values().map(Vec::len).sum()
    }

    pub fn total(&self) -> usize {
        self.issue_count() + self.hotspot_count()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Every finding recorded for `file`, issues first.
    pub fn for_file(&self, file: &FileRef) -> Vec<LiveFinding> {
        self.issues
            .get(file)
            .into_iter()
            .chain(self.hotspots.get(file))
            .flatten()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_rejects_zero_and_inverted_lines() {
        assert!(TextRange::line(0).is_err());
        assert!(TextRange::new(5, None, 4, None).is_err());
        assert!(TextRange::new(4, Some(2), 5, Some(0)).is_ok());
    }

    #[test]
    fn raw_finding_validation_flags_blank_rule() {
        let raw = RawFinding::issue("  ", FileRef::new("a.rs"), "msg", None);
        assert!(matches!(raw.validate(), Err(ModelError::InvalidFinding(_))));
    }

    #[test]
    fn findings_by_file_separates_hotspots() {
        let file = FileRef::new("a.rs");
        let mut grouped = FindingsByFile::default();
        for kind in [FindingKind::Issue, FindingKind::SecurityHotspot] {
            grouped.push(LiveFinding {
                id: FindingId::new(),
                file: file.clone(),
                rule_key: "r".into(),
                kind,
                severity: Severity::Minor,
                message: "m".into(),
                text_range: None,
                range_hash: None,
                line_hash: None,
                introduction_date: None,
                resolved: false,
                on_new_code: false,
                origin: Origin::Local,
                server_key: None,
            });
        }
        assert_eq!(grouped.issue_count(), 1);
        assert_eq!(grouped.hotspot_count(), 1);
        assert_eq!(grouped.for_file(&file).len(), 2);
    }
}
