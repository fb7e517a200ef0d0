// src/errors.rs

//! Error type shared by the watcher, the pipeline and configuration.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid base path {path:?}: {reason}")]
    InvalidBasePath { path: PathBuf, reason: String },

    #[error("Path {path:?} is outside of the watched base directory {base:?}")]
    OutsideBase { path: PathBuf, base: PathBuf },

    #[error("Notification service error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Failed to register watch on {path:?}: {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Failed to walk directory tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("A task is already processing events for this watcher")]
    LoopAlreadyRunning,

    #[error("The notification loop has not been started")]
    LoopNotStarted,

    #[error("The watcher has been closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatchError>;
