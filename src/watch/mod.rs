// src/watch/mod.rs

//! Recursive directory watching.
//!
//! This module is responsible for:
//! - Registering every directory of a tree with the OS notification service
//!   (`notify`, one non-recursive registration per directory).
//! - Draining notifications on a single loop task and classifying them.
//! - Routing classified events to watched locations, which suppress
//!   duplicates and invoke listeners.
//!
//! It does **not** debounce or act on events; that is the pipeline's job.

pub mod expiring_set;
pub mod location;
pub mod notification_loop;
pub mod path_utils;
pub mod registrar;
pub mod watcher;
pub mod worker_pool;

pub use expiring_set::ExpiringSet;
pub use location::{DEFAULT_DEDUP_WINDOW, FileListener, LocationRegistry, WatchedLocation};
pub use notification_loop::LoopStatus;
pub use registrar::{WatchHandle, WatchRegistrar};
pub use watcher::{FileWatcher, WatcherOptions};
pub use worker_pool::WorkerPool;
