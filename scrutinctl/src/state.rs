use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use scrutin_core::store::InMemoryFindingStore;
use scrutin_model::{FileRef, LiveFinding};
use serde::{Deserialize, Serialize};
use tracing::debug;

const STATE_VERSION: u32 = 1;

/// Findings persisted between CLI invocations so consecutive runs keep
/// finding identity and introduction dates.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FindingState {
    pub version: u32,
    pub analyzed_files: BTreeSet<FileRef>,
    pub findings: Vec<LiveFinding>,
}

impl FindingState {
    /// Reads `path`; a missing file yields an empty state.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no finding state yet");
            return Ok(Self {
                version: STATE_VERSION,
                ..Self::default()
            });
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read state {}", path.display()))?;
        let state: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid state file {}", path.display()))?;
        if state.version != STATE_VERSION {
            bail!(
                "unsupported state version {} in {}",
                state.version,
                path.display()
            );
        }
        Ok(state)
    }

    pub fn capture(store: &InMemoryFindingStore) -> Self {
        let live = store.snapshot();
        let findings = live
            .issues
            .into_values()
            .chain(live.hotspots.into_values())
            .flatten()
            .collect();
        Self {
            version: STATE_VERSION,
            analyzed_files: store.analyzed_files(),
            findings,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write state {}", path.display()))
    }

    /// Loads the persisted history into `store`.
    pub fn seed(self, store: &InMemoryFindingStore) {
        let mut by_file: BTreeMap<FileRef, Vec<LiveFinding>> = self
            .analyzed_files
            .into_iter()
            .map(|file| (file, Vec::new()))
            .collect();
        for finding in self.findings {
            by_file.entry(finding.file.clone()).or_default().push(finding);
        }
        for (file, findings) in by_file {
            store.seed(file, findings);
        }
    }
}
