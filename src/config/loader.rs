// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{ConfigOverrides, RawConfigFile, Settings};
use crate::errors::{Result, WatchError};

/// Read and deserialize a configuration file without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        WatchError::Config(format!("cannot read config file {}: {e}", path.display()))
    })?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file and validate it into [`Settings`].
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Settings> {
    let raw_config = load_from_path(&path)?;
    Settings::try_from(raw_config)
}

/// Combine an optional config file with command-line overrides.
///
/// Without a file, every value not given on the command line takes its
/// default.
pub fn resolve_settings(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Settings> {
    let mut raw = match path {
        Some(path) => load_from_path(path)?,
        None => RawConfigFile::default(),
    };
    raw.apply_overrides(overrides);
    Settings::try_from(raw)
}
