use std::collections::{BTreeMap, BTreeSet};

use scrutin_model::{FileRef, ScopeUnit};

use crate::error::CollaboratorError;

/// Eligible files grouped by the scope unit the engine analyzes them in.
pub type FilesByUnit = BTreeMap<ScopeUnit, BTreeSet<FileRef>>;

/// Decides which files may be analyzed and groups them by scope unit.
///
/// Must be deterministic for a given settings snapshot. `forced` bypasses
/// user configured exclusions but never structural ones (binary files,
/// files outside any unit).
pub trait ExclusionFilter: Send + Sync {
    fn partition(
        &self,
        files: &[FileRef],
        forced: bool,
        on_excluded: &mut dyn FnMut(&FileRef, &str),
    ) -> Result<FilesByUnit, CollaboratorError>;
}
