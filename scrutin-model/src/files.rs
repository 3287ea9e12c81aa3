use std::fmt;
use std::path::{Path, PathBuf};

use crate::ids::ProjectId;

/// Reference to a source file known to the host. Ordering is by path so
/// file sets iterate deterministically.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileRef {
    path: PathBuf,
}

impl FileRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, used in user facing log lines.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileRef({})", self.path.display())
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl From<&str> for FileRef {
    fn from(value: &str) -> Self {
        FileRef::new(value)
    }
}

impl From<PathBuf> for FileRef {
    fn from(value: PathBuf) -> Self {
        FileRef::new(value)
    }
}

/// The coarse grouping the engine analyzes in one call, typically a module
/// or a project root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScopeUnit {
    pub project: ProjectId,
    pub name: String,
}

impl ScopeUnit {
    pub fn new(project: ProjectId, name: impl Into<String>) -> Self {
        Self {
            project,
            name: name.into(),
        }
    }

    pub fn belongs_to(&self, project: ProjectId) -> bool {
        self.project == project
    }
}

impl fmt::Display for ScopeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
