use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use scrutin_contracts::{
    AnalysisEngine, CollaboratorError, DocumentSource, EngineOutcome,
    RawFindingSink,
};
use scrutin_model::{FileRef, RawFinding, ScopeUnit, TextRange};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::rules::{PatternRule, RuleSet};

/// Engine that applies [`RuleSet`] patterns to every line of each file.
///
/// Content comes from the same [`DocumentSource`] the orchestrator uses to
/// fingerprint findings, so reported ranges always refer to the text the
/// reconciler will read.
pub struct LinePatternEngine {
    rules: Arc<RuleSet>,
    documents: Arc<dyn DocumentSource>,
}

impl std::fmt::Debug for LinePatternEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinePatternEngine")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl LinePatternEngine {
    pub fn new(rules: Arc<RuleSet>, documents: Arc<dyn DocumentSource>) -> Self {
        Self { rules, documents }
    }

    fn scan(&self, file: &FileRef, text: &str, sink: &dyn RawFindingSink) -> usize {
        let mut emitted = 0;
        for (index, line) in text.lines().enumerate() {
            let line_number = index as u32 + 1;
            for rule in self.rules.rules() {
                for found in rule.pattern.find_iter(line) {
                    if found.is_empty() {
                        continue;
                    }
                    let Some(finding) =
                        to_finding(rule, file, line, line_number, found)
                    else {
                        continue;
                    };
                    sink.accept(finding);
                    emitted += 1;
                }
            }
        }
        emitted
    }
}

fn to_finding(
    rule: &PatternRule,
    file: &FileRef,
    line: &str,
    line_number: u32,
    found: regex::Match<'_>,
) -> Option<RawFinding> {
    let start = line[..found.start()].chars().count() as u32;
    let end = start + found.as_str().chars().count() as u32;
    let range =
        TextRange::new(line_number, Some(start), line_number, Some(end)).ok()?;
    Some(RawFinding {
        rule_key: rule.key.clone(),
        file: Some(file.clone()),
        kind: rule.kind,
        severity: rule.severity,
        message: rule.message.clone(),
        text_range: Some(range),
        on_new_code: true,
    })
}

#[async_trait]
impl AnalysisEngine for LinePatternEngine {
    async fn analyze(
        &self,
        unit: &ScopeUnit,
        files: &BTreeSet<FileRef>,
        sink: &dyn RawFindingSink,
        cancel: CancellationToken,
    ) -> Result<EngineOutcome, CollaboratorError> {
        let mut failed = BTreeSet::new();
        let mut emitted = 0;

        for file in files {
            if cancel.is_cancelled() {
                return Err(CollaboratorError::Cancelled);
            }
            match self.documents.document(file) {
                Some(document) => {
                    let count = self.scan(file, &document.text, sink);
                    trace!(file = %file, findings = count, "file scanned");
                    emitted += count;
                }
                None => {
                    debug!(file = %file, "unreadable file reported as failed");
                    failed.insert(file.clone());
                }
            }
            tokio::task::yield_now().await;
        }

        debug!(
            unit = %unit.name,
            files = files.len(),
            findings = emitted,
            failed = failed.len(),
            "unit scanned"
        );
        Ok(EngineOutcome::with_failures(failed))
    }
}
