use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use regex::Regex;
use scrutin_contracts::{
    CollaboratorError, Document, DocumentSource, ExclusionFilter, FilesByUnit,
};
use scrutin_model::{FileRef, ProjectId, ScopeUnit};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Unit name for files directly under the workspace root.
pub const ROOT_UNIT: &str = "root";

const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// Directories never walked when collecting files.
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];

/// Documents read from disk, relative to a workspace root. The stamp is the
/// file modification time in nanoseconds.
#[derive(Debug, Clone)]
pub struct FsDocuments {
    root: PathBuf,
}

impl FsDocuments {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, file: &FileRef) -> PathBuf {
        self.root.join(file.path())
    }
}

fn modification_stamp(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(since_epoch.as_nanos()).ok()
}

impl DocumentSource for FsDocuments {
    fn is_valid(&self, file: &FileRef) -> bool {
        self.resolve(file).is_file()
    }

    fn document(&self, file: &FileRef) -> Option<Document> {
        let path = self.resolve(file);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                debug!(file = %file, error = %err, "document unavailable");
                return None;
            }
        };
        let stamp = modification_stamp(&path).unwrap_or_default();
        Some(Document::new(text, stamp))
    }
}

/// Exclusion policy of the CLI.
///
/// Files matching a user pattern are skipped unless the run is forced.
/// Missing and binary files are always skipped. Remaining files are grouped
/// by their first directory component.
#[derive(Debug, Clone)]
pub struct DirectoryExclusions {
    project: ProjectId,
    root: PathBuf,
    patterns: Vec<Regex>,
}

impl DirectoryExclusions {
    pub fn new(project: ProjectId, root: impl Into<PathBuf>) -> Self {
        Self {
            project,
            root: root.into(),
            patterns: Vec::new(),
        }
    }

    pub fn with_patterns(mut self, patterns: Vec<Regex>) -> Self {
        self.patterns = patterns;
        self
    }

    fn user_exclusion(&self, file: &FileRef) -> Option<String> {
        let path = file.path().to_string_lossy();
        self.patterns
            .iter()
            .find(|pattern| pattern.is_match(&path))
            .map(|pattern| format!("matches exclusion pattern '{pattern}'"))
    }

    fn structural_exclusion(&self, file: &FileRef) -> Option<&'static str> {
        let path = self.root.join(file.path());
        if !path.is_file() {
            return Some("file does not exist");
        }
        match looks_binary(&path) {
            Ok(true) => Some("binary file"),
            Ok(false) => None,
            Err(_) => Some("file is not readable"),
        }
    }

    fn unit_for(&self, file: &FileRef) -> ScopeUnit {
        let mut components = file.path().components();
        let first = components.next();
        let name = match (first, components.next()) {
            (Some(dir), Some(_)) => dir.as_os_str().to_string_lossy().into_owned(),
            _ => ROOT_UNIT.to_string(),
        };
        ScopeUnit::new(self.project, name)
    }
}

fn looks_binary(path: &Path) -> std::io::Result<bool> {
    let mut head = Vec::with_capacity(BINARY_SNIFF_BYTES);
    std::fs::File::open(path)?
        .take(BINARY_SNIFF_BYTES as u64)
        .read_to_end(&mut head)?;
    Ok(head.contains(&0))
}

impl ExclusionFilter for DirectoryExclusions {
    fn partition(
        &self,
        files: &[FileRef],
        forced: bool,
        on_excluded: &mut dyn FnMut(&FileRef, &str),
    ) -> Result<FilesByUnit, CollaboratorError> {
        let mut units = FilesByUnit::new();
        for file in files {
            if let Some(reason) = self.structural_exclusion(file) {
                on_excluded(file, reason);
                continue;
            }
            if !forced && let Some(reason) = self.user_exclusion(file) {
                on_excluded(file, &reason);
                continue;
            }
            units
                .entry(self.unit_for(file))
                .or_default()
                .insert(file.clone());
        }
        Ok(units)
    }
}

/// Expands `inputs` into files relative to `root`. Directories are walked
/// recursively, skipping VCS and build output directories.
pub fn collect_files(root: &Path, inputs: &[PathBuf]) -> Vec<FileRef> {
    let mut files = Vec::new();
    let targets: Vec<PathBuf> = if inputs.is_empty() {
        vec![root.to_path_buf()]
    } else {
        inputs
            .iter()
            .map(|input| {
                if input.is_absolute() {
                    input.clone()
                } else {
                    root.join(input)
                }
            })
            .collect()
    };

    for absolute in targets {
        let walker = WalkDir::new(&absolute)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !(entry.file_type().is_dir()
                        && SKIPPED_DIRS
                            .iter()
                            .any(|skipped| entry.file_name() == *skipped))
            });
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    match entry.path().strip_prefix(root) {
                        Ok(relative) => files.push(FileRef::new(relative)),
                        Err(_) => warn!(
                            path = %entry.path().display(),
                            "skipping file outside the workspace root"
                        ),
                    }
                }
                Ok(_) => {}
                Err(err) => warn!("error walking directory: {err}"),
            }
        }
    }

    files.sort();
    files.dedup();
    files
}
