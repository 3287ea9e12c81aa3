use std::collections::BTreeSet;
use std::fmt::Write as _;

use clap::ValueEnum;
use parking_lot::Mutex;
use scrutin_contracts::AnalysisCallback;
use scrutin_core::orchestration::RunReport;
use scrutin_model::{FileRef, FindingsByFile, LiveFinding, Severity};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Logs run progress and keeps the terminal notification for the caller.
#[derive(Debug, Default)]
pub struct ProgressCallback {
    failed_files: Mutex<Option<BTreeSet<FileRef>>>,
    error: Mutex<Option<String>>,
}

impl ProgressCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files the engine could not analyze, once the run succeeded.
    pub fn failed_files(&self) -> Option<BTreeSet<FileRef>> {
        self.failed_files.lock().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }
}

impl AnalysisCallback for ProgressCallback {
    fn on_success(&self, failed_files: BTreeSet<FileRef>) {
        *self.failed_files.lock() = Some(failed_files);
    }

    fn on_error(&self, err: &(dyn std::error::Error + Send + Sync + 'static)) {
        error!("analysis failed: {err}");
        *self.error.lock() = Some(err.to_string());
    }

    fn on_intermediate_result(&self, findings: FindingsByFile) {
        info!(
            issues = findings.issue_count(),
            hotspots = findings.hotspot_count(),
            files = findings.issues.len() + findings.hotspots.len(),
            "partial results"
        );
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Minor => "minor",
        Severity::Major => "major",
        Severity::Critical => "critical",
        Severity::Blocker => "blocker",
    }
}

fn ordered(findings: &FindingsByFile) -> Vec<&LiveFinding> {
    let mut all: Vec<&LiveFinding> = findings
        .issues
        .values()
        .chain(findings.hotspots.values())
        .flatten()
        .collect();
    all.sort_by(|a, b| {
        (&a.file, a.line(), &a.rule_key).cmp(&(&b.file, b.line(), &b.rule_key))
    });
    all
}

pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    for finding in ordered(&report.findings) {
        let location = match finding.text_range {
            Some(range) => format!(
                "{}:{}:{}",
                finding.file,
                range.start_line,
                range.start_line_offset.unwrap_or(0) + 1
            ),
            None => finding.file.to_string(),
        };
        let marker = if finding.is_hotspot() { " (hotspot)" } else { "" };
        let age = if finding.introduction_date == Some(report.analysis_date) {
            " [new]"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "{location}: {} [{}]{marker}{age} {}",
            severity_label(finding.severity),
            finding.rule_key,
            finding.message
        );
    }
    for file in &report.failed_files {
        let _ = writeln!(out, "{file}: analysis failed, results may be incomplete");
    }
    let _ = writeln!(
        out,
        "{} issue(s), {} hotspot(s) in {} analyzed file(s) ({} ms)",
        report.findings.issue_count(),
        report.findings.hotspot_count(),
        report.analyzed_files,
        report.elapsed.as_millis()
    );
    out
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    issues: usize,
    hotspots: usize,
    analyzed_files: usize,
    raw_findings: usize,
    elapsed_ms: u128,
    rules: &'a BTreeSet<String>,
    failed_files: Vec<String>,
    findings: Vec<&'a LiveFinding>,
}

pub fn render_json(report: &RunReport) -> serde_json::Result<String> {
    let body = JsonReport {
        issues: report.findings.issue_count(),
        hotspots: report.findings.hotspot_count(),
        analyzed_files: report.analyzed_files,
        raw_findings: report.raw_finding_count,
        elapsed_ms: report.elapsed.as_millis(),
        rules: &report.rule_keys,
        failed_files: report.failed_files.iter().map(ToString::to_string).collect(),
        findings: ordered(&report.findings),
    };
    serde_json::to_string_pretty(&body)
}
