use std::fmt;

/// Why an analysis run was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TriggerType {
    /// Explicit user action.
    Action,
    EditorOpen,
    EditorChange,
    FileSave,
    CheckIn,
    ConfigChange,
    BindingUpdate,
    CompilationFinished,
    Periodic,
}

impl TriggerType {
    /// Triggers that originate from a direct user gesture rather than an
    /// automatic hook.
    pub fn is_user_initiated(&self) -> bool {
        matches!(self, TriggerType::Action | TriggerType::CheckIn)
    }

    /// Explicit analysis requests skip user configured exclusions.
    pub fn forces_analysis(&self) -> bool {
        matches!(self, TriggerType::Action)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TriggerType::Action => "Action",
            TriggerType::EditorOpen => "Editor open",
            TriggerType::EditorChange => "Editor change",
            TriggerType::FileSave => "File save",
            TriggerType::CheckIn => "Pre-commit check",
            TriggerType::ConfigChange => "Config change",
            TriggerType::BindingUpdate => "Binding update",
            TriggerType::CompilationFinished => "Compilation finished",
            TriggerType::Periodic => "Periodic",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
