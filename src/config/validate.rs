// src/config/validate.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{RawConfigFile, Settings};
use crate::errors::{Result, WatchError};
use crate::pipeline::DEFAULT_QUIET_PERIOD;
use crate::types::ChangeKind;
use crate::watch::DEFAULT_DEDUP_WINDOW;
use crate::watch::worker_pool::MIN_WORKERS;

impl TryFrom<RawConfigFile> for Settings {
    type Error = WatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let folder = resolve_folder(raw.watch.folder.as_deref())?;
        let kinds = validate_kinds(raw.watch.kinds.as_deref())?;
        validate_workers(raw.workers.count)?;

        let command_delay =
            duration_field("timing.command_delay", raw.timing.command_delay.as_deref(), Duration::ZERO)?;
        let dedup_window = duration_field(
            "timing.dedup_window",
            raw.timing.dedup_window.as_deref(),
            DEFAULT_DEDUP_WINDOW,
        )?;
        let quiet_period = duration_field(
            "timing.quiet_period",
            raw.timing.quiet_period.as_deref(),
            DEFAULT_QUIET_PERIOD,
        )?;
        if dedup_window.is_zero() {
            return Err(WatchError::Config(
                "[timing].dedup_window must be greater than 0".to_string(),
            ));
        }

        Ok(Settings {
            folder,
            recursive: raw.watch.recursive,
            auto_register: raw.watch.auto_register,
            kinds,
            command_delay,
            dedup_window,
            quiet_period,
            workers: raw.workers.count,
        })
    }
}

fn resolve_folder(folder: Option<&Path>) -> Result<PathBuf> {
    let folder = match folder {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => std::env::current_dir()?.join(path),
        None => std::env::current_dir()?,
    };

    if !folder.exists() {
        return Err(WatchError::Config(format!(
            "path '{}' does not exist, please specify a valid folder and try again",
            folder.display()
        )));
    }
    if !folder.is_dir() {
        return Err(WatchError::Config(format!(
            "path '{}' is not a folder, please specify a valid folder and try again",
            folder.display()
        )));
    }
    Ok(folder)
}

fn validate_kinds(kinds: Option<&[ChangeKind]>) -> Result<BTreeSet<ChangeKind>> {
    let Some(kinds) = kinds else {
        return Ok(ChangeKind::CREATE_AND_MODIFY.into_iter().collect());
    };
    if kinds.is_empty() {
        return Err(WatchError::Config(
            "[watch].kinds cannot be empty".to_string(),
        ));
    }
    if kinds.contains(&ChangeKind::Other) {
        return Err(WatchError::Config(
            "[watch].kinds accepts only create, modify and delete".to_string(),
        ));
    }
    Ok(kinds.iter().copied().collect())
}

fn validate_workers(count: usize) -> Result<()> {
    if count < MIN_WORKERS {
        return Err(WatchError::Config(format!(
            "[workers].count must be >= {MIN_WORKERS} (got {count})"
        )));
    }
    Ok(())
}

fn duration_field(name: &str, value: Option<&str>, default: Duration) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(s) => parse_duration(s).map_err(|e| WatchError::Config(format!("{name}: {e}"))),
    }
}
