// src/types.rs

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use notify::event::{ModifyKind, RenameMode};
use notify::EventKind;
use serde::Deserialize;

/// Semantic kind of a file change, as reported to listeners.
///
/// Every raw OS notification is mapped onto one of these four kinds by
/// [`ChangeKind::classify`]; listeners never see backend-specific kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
    Other,
}

impl ChangeKind {
    /// Kinds that trigger actions when nothing else is configured.
    pub const CREATE_AND_MODIFY: [ChangeKind; 2] = [ChangeKind::Create, ChangeKind::Modify];

    /// Map a raw `notify` event kind onto a semantic kind.
    ///
    /// Renames are split the way directory-level watch services report them:
    /// the source name disappears (`Delete`) and the target name appears
    /// (`Create`). A rename reported without a direction is `Other`.
    pub fn classify(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => ChangeKind::Create,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Delete,
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Create,
            EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Other,
            EventKind::Modify(_) => ChangeKind::Modify,
            EventKind::Remove(_) => ChangeKind::Delete,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => ChangeKind::Other,
        }
    }

    pub fn is_create_or_modify(self) -> bool {
        matches!(self, ChangeKind::Create | ChangeKind::Modify)
    }

    /// Capitalised name used in user-facing summaries (`"Create"`).
    pub fn display_name(self) -> &'static str {
        match self {
            ChangeKind::Create => "Create",
            ChangeKind::Modify => "Modify",
            ChangeKind::Delete => "Delete",
            ChangeKind::Other => "Other",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Modify => "modify",
            ChangeKind::Delete => "delete",
            ChangeKind::Other => "other",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(ChangeKind::Create),
            "modify" => Ok(ChangeKind::Modify),
            "delete" => Ok(ChangeKind::Delete),
            "other" => Ok(ChangeKind::Other),
            other => Err(format!(
                "invalid change kind: {other} (expected \"create\", \"modify\", \"delete\" or \"other\")"
            )),
        }
    }
}

/// A classified notification resolved against the directory it came from.
///
/// Produced by the notification loop and consumed immediately by the location
/// registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Absolute path of the changed entry.
    pub path: PathBuf,
    pub kind: ChangeKind,
    /// Absolute path of the watched directory that reported the change.
    pub directory: PathBuf,
}

/// A change that survived the coalescing pipeline. `path` is relative to the
/// watcher's base directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoalescedEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl CoalescedEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}
