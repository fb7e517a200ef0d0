// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::ConfigOverrides;
use crate::types::ChangeKind;

/// Command-line arguments for `watchrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "watchrun",
    version,
    about = "Watch a folder recursively and act on file changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to an optional config file (TOML).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Base folder to watch. Defaults to the current directory.
    #[arg(long, value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Wait this long after the last change before acting (e.g. 200ms, 2s;
    /// a bare number is milliseconds).
    #[arg(short, long, value_name = "DURATION")]
    pub delay: Option<String>,

    /// Only act on files directly inside the base folder.
    #[arg(long)]
    pub disable_recursive: bool,

    /// Do not watch subdirectories created while running.
    #[arg(long)]
    pub no_auto_register: bool,

    /// Act on file creation.
    #[arg(long)]
    pub on_create: bool,

    /// Act on file modification.
    #[arg(long)]
    pub on_modify: bool,

    /// Act on deletion. Deleted folders trigger as well, since a deleted
    /// entry can no longer be told apart from a file.
    #[arg(long)]
    pub on_delete: bool,

    /// Number of worker threads processing notifications (at least 2).
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WATCHRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the configuration and print the summary without watching.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// The subset of arguments that override config file values.
    pub fn overrides(&self) -> ConfigOverrides {
        let kinds = [
            (self.on_create, ChangeKind::Create),
            (self.on_modify, ChangeKind::Modify),
            (self.on_delete, ChangeKind::Delete),
        ]
        .into_iter()
        .filter_map(|(enabled, kind)| enabled.then_some(kind))
        .collect();

        ConfigOverrides {
            folder: self.path.clone(),
            command_delay: self.delay.clone(),
            disable_recursive: self.disable_recursive,
            no_auto_register: self.no_auto_register,
            kinds,
            workers: self.workers,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
