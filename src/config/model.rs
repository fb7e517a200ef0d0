// src/config/model.rs

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::duration::format_duration;
use crate::types::ChangeKind;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [watch]
/// folder = "/srv/site"
/// recursive = true
/// auto_register = true
/// kinds = ["create", "modify"]
///
/// [timing]
/// command_delay = "200ms"
/// dedup_window = "500ms"
/// quiet_period = "50ms"
///
/// [workers]
/// count = 2
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub timing: TimingSection,

    #[serde(default)]
    pub workers: WorkersSection,
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    /// Base folder; the current directory when unset. Relative paths are
    /// resolved against the current directory.
    #[serde(default)]
    pub folder: Option<PathBuf>,

    /// When false, only files directly inside `folder` trigger actions.
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Watch subdirectories created while running.
    #[serde(default = "default_true")]
    pub auto_register: bool,

    /// Change kinds that trigger actions. Unset means create and modify.
    #[serde(default)]
    pub kinds: Option<Vec<ChangeKind>>,
}

fn default_true() -> bool {
    true
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            folder: None,
            recursive: true,
            auto_register: true,
            kinds: None,
        }
    }
}

/// `[timing]` section. Values are duration strings such as `"200ms"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingSection {
    #[serde(default)]
    pub command_delay: Option<String>,

    #[serde(default)]
    pub dedup_window: Option<String>,

    #[serde(default)]
    pub quiet_period: Option<String>,
}

/// `[workers]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkersSection {
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

fn default_worker_count() -> usize {
    crate::watch::worker_pool::MIN_WORKERS
}

impl Default for WorkersSection {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

/// Values given on the command line. Each one that is set replaces the
/// corresponding file value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub folder: Option<PathBuf>,
    pub command_delay: Option<String>,
    pub disable_recursive: bool,
    pub no_auto_register: bool,
    /// Kinds selected by flags; empty means "keep the file's choice".
    pub kinds: Vec<ChangeKind>,
    pub workers: Option<usize>,
}

impl RawConfigFile {
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(folder) = &overrides.folder {
            self.watch.folder = Some(folder.clone());
        }
        if let Some(delay) = &overrides.command_delay {
            self.timing.command_delay = Some(delay.clone());
        }
        if overrides.disable_recursive {
            self.watch.recursive = false;
        }
        if overrides.no_auto_register {
            self.watch.auto_register = false;
        }
        if !overrides.kinds.is_empty() {
            self.watch.kinds = Some(overrides.kinds.clone());
        }
        if let Some(count) = overrides.workers {
            self.workers.count = count;
        }
    }
}

/// Validated runtime settings. Build through `Settings::try_from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Absolute path of an existing directory.
    pub folder: PathBuf,
    pub recursive: bool,
    pub auto_register: bool,
    /// Never empty.
    pub kinds: BTreeSet<ChangeKind>,
    pub command_delay: Duration,
    pub dedup_window: Duration,
    pub quiet_period: Duration,
    pub workers: usize,
}

impl Settings {
    /// Short description of the active options for the startup banner.
    pub fn one_line_summary(&self) -> String {
        let mut out = format!("Monitoring folder '{}'", self.folder.display());
        if !self.command_delay.is_zero() {
            out.push_str(&format!(" (delay: {})", format_duration(self.command_delay)));
        }
        if !self.recursive {
            out.push_str(". Monitoring only provided path (non-recursive)");
        }
        if !self.auto_register {
            out.push_str(". New subdirectories are not watched");
        }
        let kinds: Vec<&str> = self.kinds.iter().map(|k| k.display_name()).collect();
        out.push_str(&format!(". Watching for: {}", kinds.join(", ")));
        out
    }
}
