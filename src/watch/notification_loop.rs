// src/watch/notification_loop.rs

//! The single task that drains OS notifications.
//!
//! Each raw `notify` event is split into batches per originating directory.
//! A batch is resolved against the registration table, every notification in
//! it is classified, and the resulting work (listener delivery, registration
//! of new directories) is handed to the worker pool so a slow listener never
//! stalls draining. Duplicate suppression happens inline, in notification
//! order, before anything is handed off.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use notify::{Event, EventKind};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, trace, warn};
use walkdir::WalkDir;

use crate::errors::{Result, WatchError};
use crate::types::{ChangeKind, RawEvent};
use crate::watch::location::LocationRegistry;
use crate::watch::registrar::{is_subscribed, NotificationReceiver, WatchRegistrar};
use crate::watch::worker_pool::WorkerPool;

/// Everything the loop and its worker jobs operate on.
#[derive(Debug)]
pub struct LoopContext {
    pub registrar: WatchRegistrar,
    pub registry: LocationRegistry,
    pub pool: WorkerPool,
    /// Register directories created under a watched directory.
    pub auto_register: bool,
}

/// Lifecycle of the loop as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Idle,
    Running,
    Stopped,
}

enum LoopState {
    Idle(NotificationReceiver),
    Running(AbortHandle),
    Stopped,
}

/// Owner of the notification-draining task. At most one task runs per loop.
pub struct NotificationLoop {
    state: Mutex<LoopState>,
    finished: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for NotificationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationLoop")
            .field("status", &self.status())
            .finish()
    }
}

/// Marks the loop finished when the task ends, including on abort.
struct FinishedGuard(Arc<watch::Sender<bool>>);

impl Drop for FinishedGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

impl NotificationLoop {
    pub fn new(events: NotificationReceiver) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            state: Mutex::new(LoopState::Idle(events)),
            finished: Arc::new(finished),
        }
    }

    pub fn status(&self) -> LoopStatus {
        let Ok(state) = self.state.lock() else {
            return LoopStatus::Stopped;
        };
        match *state {
            LoopState::Idle(_) => LoopStatus::Idle,
            LoopState::Running(_) if !*self.finished.borrow() => LoopStatus::Running,
            _ => LoopStatus::Stopped,
        }
    }

    /// Spawn the draining task. Fails with [`WatchError::LoopAlreadyRunning`]
    /// if the loop was started before. Must be called within a Tokio runtime.
    pub fn start(&self, ctx: Arc<LoopContext>) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("notification loop mutex poisoned"))?;

        let events = match std::mem::replace(&mut *state, LoopState::Stopped) {
            LoopState::Idle(events) => events,
            other => {
                *state = other;
                return Err(WatchError::LoopAlreadyRunning);
            }
        };

        let guard = FinishedGuard(Arc::clone(&self.finished));
        let task = tokio::spawn(async move {
            let _guard = guard;
            drain(events, ctx).await;
        });
        *state = LoopState::Running(task.abort_handle());
        Ok(())
    }

    /// Cancel the draining task, or retire the loop if it never started.
    pub fn cancel(&self) -> anyhow::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("notification loop mutex poisoned"))?;
        match std::mem::replace(&mut *state, LoopState::Stopped) {
            LoopState::Running(task) => {
                task.abort();
                // Keep the handle so `status()` still reflects the real task.
                *state = LoopState::Running(task);
            }
            LoopState::Idle(_) | LoopState::Stopped => {
                self.finished.send_replace(true);
            }
        }
        Ok(())
    }

    /// Wait until the draining task has terminated.
    ///
    /// Fails with [`WatchError::LoopNotStarted`] if the loop was never
    /// started (and not cancelled either).
    pub async fn join(&self) -> Result<()> {
        {
            let state = self
                .state
                .lock()
                .map_err(|_| anyhow!("notification loop mutex poisoned"))?;
            if matches!(*state, LoopState::Idle(_)) {
                return Err(WatchError::LoopNotStarted);
            }
        }

        let mut finished = self.finished.subscribe();
        // The sender lives as long as `self`, so this only ends on `true`.
        let _ = finished.wait_for(|done| *done).await;
        Ok(())
    }
}

/// One entry of a batch: the raw kind and the entry name inside the batch's
/// directory.
#[derive(Debug, Clone)]
struct Notification {
    kind: EventKind,
    name: OsString,
}

/// Notifications that originate from the same watched directory.
#[derive(Debug, Clone)]
struct NotificationBatch {
    directory: PathBuf,
    notifications: Vec<Notification>,
}

impl NotificationBatch {
    /// Split a backend event into per-directory batches, keeping order.
    /// Paths without a final name component are skipped.
    fn split(event: Event) -> Vec<NotificationBatch> {
        let mut batches: Vec<NotificationBatch> = Vec::new();
        for path in event.paths {
            let (Some(directory), Some(name)) = (path.parent(), path.file_name()) else {
                trace!(?path, "notification without an entry name; skipped");
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let notification = Notification {
                kind: event.kind,
                name: name.to_os_string(),
            };
            match batches.iter_mut().find(|b| b.directory == directory) {
                Some(batch) => batch.notifications.push(notification),
                None => batches.push(NotificationBatch {
                    directory: directory.to_path_buf(),
                    notifications: vec![notification],
                }),
            }
        }
        batches
    }
}

async fn drain(mut events: NotificationReceiver, ctx: Arc<LoopContext>) {
    info!("notification loop started");

    while let Some(received) = events.recv().await {
        let event = match received {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "notification service reported an error");
                continue;
            }
        };

        if event.need_rescan() {
            warn!("notification queue overflowed; some changes may have been missed");
            continue;
        }
        if !is_subscribed(&event.kind) {
            continue;
        }

        for batch in NotificationBatch::split(event) {
            process_batch(&ctx, batch);
        }
    }

    info!("notification loop finished (service closed)");
}

fn process_batch(ctx: &Arc<LoopContext>, batch: NotificationBatch) {
    let Some(handle) = ctx.registrar.handle_for(&batch.directory) else {
        debug!(dir = ?batch.directory, "notifications for an untracked directory; discarded");
        ctx.registrar.release(&batch.directory);
        return;
    };

    for notification in batch.notifications {
        let path = batch.directory.join(&notification.name);
        let kind = ChangeKind::classify(&notification.kind);
        trace!(?path, %kind, raw = ?notification.kind, "classified notification");

        if kind == ChangeKind::Create && ctx.auto_register && is_directory(&path) {
            let job_ctx = Arc::clone(ctx);
            if let Err(err) = ctx.pool.submit("register", move || {
                register_new_directory(&job_ctx, &path);
            }) {
                debug!(error = %err, "could not schedule directory registration");
            }
            continue;
        }

        // The path may no longer exist, so a registered directory by that
        // name is the only way to tell it was a directory.
        if kind == ChangeKind::Delete && ctx.registrar.is_registered(&path) {
            ctx.registrar.invalidate_tree(&path);
        }

        let event = RawEvent {
            path,
            kind,
            directory: batch.directory.clone(),
        };
        for delivery in ctx.registry.route(&event) {
            if let Err(err) = ctx.pool.submit("deliver", move || delivery.deliver()) {
                debug!(error = %err, "could not schedule listener delivery");
                return;
            }
        }
    }

    if !ctx.registrar.rearm(handle) {
        debug!(dir = ?batch.directory, "directory no longer watched");
    }
}

fn is_directory(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

/// Register a freshly created directory tree, then report the files that
/// were created in it before its watches were armed.
fn register_new_directory(ctx: &LoopContext, directory: &Path) {
    if let Err(err) = ctx.registrar.register_recursively(directory) {
        error!(dir = ?directory, error = %err, "failed to register newly created directory");
        return;
    }
    debug!(dir = ?directory, "registered newly created directory");

    for entry in WalkDir::new(directory)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.into_path();
        let Some(parent) = path.parent().map(Path::to_path_buf) else {
            continue;
        };
        ctx.registry.dispatch(&RawEvent {
            path,
            kind: ChangeKind::Create,
            directory: parent,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RenameMode};

    #[test]
    fn batches_group_paths_by_directory() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/w/a/old.txt"))
            .add_path(PathBuf::from("/w/b/new.txt"))
            .add_path(PathBuf::from("/w/a/other.txt"));

        let batches = NotificationBatch::split(event);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].directory, PathBuf::from("/w/a"));
        assert_eq!(batches[0].notifications.len(), 2);
        assert_eq!(batches[0].notifications[1].name, OsString::from("other.txt"));
        assert_eq!(batches[1].directory, PathBuf::from("/w/b"));
    }

    #[test]
    fn paths_without_a_name_are_skipped() {
        let event = Event::new(EventKind::Create(CreateKind::Any)).add_path(PathBuf::from("/"));
        assert!(NotificationBatch::split(event).is_empty());
    }

    #[tokio::test]
    async fn second_start_fails_fast() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = Arc::new(LoopContext {
            registrar: WatchRegistrar::new(tx).unwrap(),
            registry: LocationRegistry::new("/tmp", crate::watch::location::DEFAULT_DEDUP_WINDOW),
            pool: WorkerPool::new(2),
            auto_register: true,
        });
        let event_loop = NotificationLoop::new(rx);
        assert_eq!(event_loop.status(), LoopStatus::Idle);

        event_loop.start(Arc::clone(&ctx)).unwrap();
        assert!(matches!(
            event_loop.start(Arc::clone(&ctx)),
            Err(WatchError::LoopAlreadyRunning)
        ));

        event_loop.cancel().unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), event_loop.join())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event_loop.status(), LoopStatus::Stopped);
    }

    #[tokio::test]
    async fn join_before_start_is_an_error() {
        let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let event_loop = NotificationLoop::new(rx);
        assert!(matches!(
            event_loop.join().await,
            Err(WatchError::LoopNotStarted)
        ));
    }

    #[tokio::test]
    async fn cancelling_an_idle_loop_retires_it() {
        let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let event_loop = NotificationLoop::new(rx);
        event_loop.cancel().unwrap();
        event_loop.join().await.unwrap();
        assert_eq!(event_loop.status(), LoopStatus::Stopped);
    }
}
