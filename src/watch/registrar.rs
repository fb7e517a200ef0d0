// src/watch/registrar.rs

//! Ownership of OS watch registrations.
//!
//! Every watched directory is registered individually (non-recursively) with
//! the `notify` backend and tracked under an opaque [`WatchHandle`]. Recursive
//! coverage is built by walking the tree and registering each directory, plus
//! live registration of directories created later (see the notification loop).

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::anyhow;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::errors::{Result, WatchError};

/// Raw notifications as delivered by the `notify` backend thread.
pub type NotificationSender = mpsc::UnboundedSender<notify::Result<Event>>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Opaque token for one registered directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(u64);

/// Owns the OS notification service and the handle <-> directory tables.
///
/// Invariant: a directory has at most one live handle. Registering an already
/// registered directory returns the existing handle.
pub struct WatchRegistrar {
    /// `None` once the registrar has been closed.
    service: Mutex<Option<RecommendedWatcher>>,
    handles: DashMap<WatchHandle, PathBuf>,
    directories: DashMap<PathBuf, WatchHandle>,
    next_handle: AtomicU64,
}

impl std::fmt::Debug for WatchRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistrar")
            .field("registered", &self.handles.len())
            .finish_non_exhaustive()
    }
}

impl WatchRegistrar {
    /// Start the notification service. Every raw notification (or backend
    /// error) is forwarded to `events`.
    pub fn new(events: NotificationSender) -> Result<Self> {
        let service = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // The receiver is gone once the loop has stopped; nothing left to do.
                if events.send(res).is_err() {
                    trace!("notification dropped: loop no longer receiving");
                }
            },
            Config::default(),
        )?;

        Ok(Self {
            service: Mutex::new(Some(service)),
            handles: DashMap::new(),
            directories: DashMap::new(),
            next_handle: AtomicU64::new(1),
        })
    }

    /// Register a single directory for create/modify/delete notifications.
    pub fn register(&self, directory: &Path) -> Result<WatchHandle> {
        match self.directories.entry(directory.to_path_buf()) {
            Entry::Occupied(existing) => Ok(*existing.get()),
            Entry::Vacant(slot) => {
                {
                    let mut guard = self
                        .service
                        .lock()
                        .map_err(|_| anyhow!("notification service mutex poisoned"))?;
                    let service = guard.as_mut().ok_or(WatchError::Closed)?;
                    service
                        .watch(directory, RecursiveMode::NonRecursive)
                        .map_err(|source| WatchError::Register {
                            path: directory.to_path_buf(),
                            source,
                        })?;
                }

                let handle = WatchHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
                self.handles.insert(handle, directory.to_path_buf());
                slot.insert(handle);
                debug!(?handle, dir = ?directory, "registered directory");
                Ok(handle)
            }
        }
    }

    /// Register `root` and every directory below it, parents before children.
    ///
    /// Stops at the first failure. Directories created while the walk is in
    /// progress may be missed; those are picked up by live registration.
    pub fn register_recursively(&self, root: &Path) -> Result<()> {
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry?;
            if entry.file_type().is_dir() {
                self.register(entry.path())?;
            }
        }
        Ok(())
    }

    pub fn directory_of(&self, handle: WatchHandle) -> Option<PathBuf> {
        self.handles.get(&handle).map(|dir| dir.value().clone())
    }

    pub fn handle_for(&self, directory: &Path) -> Option<WatchHandle> {
        self.directories.get(directory).map(|h| *h.value())
    }

    pub fn is_registered(&self, directory: &Path) -> bool {
        self.directories.contains_key(directory)
    }

    pub fn registered_directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.directories.iter().map(|e| e.key().clone()).collect();
        dirs.sort();
        dirs
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Re-arm a handle after its batch was processed.
    ///
    /// A handle stays valid while its directory still exists. Returns `false`
    /// (and drops the handle for good) otherwise.
    pub fn rearm(&self, handle: WatchHandle) -> bool {
        let Some(directory) = self.directory_of(handle) else {
            return false;
        };
        if directory.is_dir() {
            return true;
        }
        debug!(?handle, dir = ?directory, "watched directory is gone; dropping its handle");
        self.invalidate(handle);
        false
    }

    /// Remove a handle from the tables and release its OS registration.
    pub fn invalidate(&self, handle: WatchHandle) {
        let Some((_, directory)) = self.handles.remove(&handle) else {
            return;
        };
        self.directories.remove_if(&directory, |_, h| *h == handle);
        self.release(&directory);
    }

    /// Drop `directory` and every registered directory below it. Used when
    /// a directory is deleted or renamed away.
    pub fn invalidate_tree(&self, directory: &Path) {
        let doomed: Vec<WatchHandle> = self
            .directories
            .iter()
            .filter(|entry| entry.key().starts_with(directory))
            .map(|entry| *entry.value())
            .collect();
        for handle in doomed {
            self.invalidate(handle);
        }
    }

    /// Release an OS registration that is not (or no longer) tracked.
    pub fn release(&self, directory: &Path) {
        let Ok(mut guard) = self.service.lock() else {
            return;
        };
        if let Some(service) = guard.as_mut() {
            // The backend usually dropped the watch itself when the directory vanished.
            if let Err(err) = service.unwatch(directory) {
                trace!(dir = ?directory, error = %err, "unwatch failed");
            }
        }
    }

    /// Shut the notification service down and forget every registration.
    ///
    /// Dropping the backend drops the forwarding callback, which closes the
    /// notification channel and lets the loop observe the shutdown.
    pub fn close(&self) -> anyhow::Result<()> {
        let service = self
            .service
            .lock()
            .map_err(|_| anyhow!("notification service mutex poisoned"))?
            .take();
        self.handles.clear();
        self.directories.clear();
        if service.is_some() {
            debug!("notification service closed");
        }
        drop(service);
        Ok(())
    }
}

/// Whether a raw notification kind is one the watcher subscribes to.
///
/// Only creations, modifications and deletions are of interest; access
/// notifications and the combined rename notification (already reported as
/// its two halves) are ignored.
pub fn is_subscribed(kind: &EventKind) -> bool {
    !matches!(
        kind,
        EventKind::Access(_) | EventKind::Modify(ModifyKind::Name(RenameMode::Both))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind};

    fn registrar() -> (WatchRegistrar, NotificationReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WatchRegistrar::new(tx).unwrap(), rx)
    }

    #[test]
    fn registering_twice_yields_the_same_handle() {
        let dir = tempfile::tempdir().unwrap();
        let (registrar, _rx) = registrar();

        let first = registrar.register(dir.path()).unwrap();
        let second = registrar.register(dir.path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(registrar.len(), 1);
        assert_eq!(registrar.directory_of(first).as_deref(), Some(dir.path()));
    }

    #[test]
    fn recursive_registration_covers_every_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::create_dir_all(dir.path().join("c")).unwrap();
        std::fs::write(dir.path().join("a/file.txt"), b"x").unwrap();
        let (registrar, _rx) = registrar();

        registrar.register_recursively(dir.path()).unwrap();

        assert_eq!(registrar.len(), 4);
        assert!(registrar.is_registered(&dir.path().join("a/b")));
        assert!(registrar.is_registered(&dir.path().join("c")));
        assert!(!registrar.is_registered(&dir.path().join("a/file.txt")));
    }

    #[test]
    fn registering_a_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (registrar, _rx) = registrar();

        let result = registrar.register(&dir.path().join("missing"));

        assert!(matches!(result, Err(WatchError::Register { .. })));
        assert!(registrar.is_empty());
    }

    #[test]
    fn rearm_drops_handles_of_deleted_directories() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let (registrar, _rx) = registrar();
        let root_handle = registrar.register(dir.path()).unwrap();
        let sub_handle = registrar.register(&sub).unwrap();

        std::fs::remove_dir(&sub).unwrap();

        assert!(registrar.rearm(root_handle));
        assert!(!registrar.rearm(sub_handle));
        assert!(!registrar.is_registered(&sub));
        assert_eq!(registrar.directory_of(sub_handle), None);
    }

    #[test]
    fn invalidating_a_tree_drops_nested_registrations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        std::fs::create_dir_all(dir.path().join("ab")).unwrap();
        let (registrar, _rx) = registrar();
        registrar.register_recursively(dir.path()).unwrap();

        registrar.invalidate_tree(&dir.path().join("a"));

        assert_eq!(
            registrar.registered_directories(),
            vec![dir.path().to_path_buf(), dir.path().join("ab")]
        );
    }

    #[test]
    fn closed_registrar_rejects_registration() {
        let dir = tempfile::tempdir().unwrap();
        let (registrar, _rx) = registrar();
        registrar.register(dir.path()).unwrap();

        registrar.close().unwrap();

        assert!(registrar.is_empty());
        assert!(matches!(
            registrar.register(dir.path()),
            Err(WatchError::Closed)
        ));
        // Closing twice is harmless.
        registrar.close().unwrap();
    }

    #[test]
    fn access_notifications_are_not_subscribed() {
        assert!(!is_subscribed(&EventKind::Access(AccessKind::Any)));
        assert!(!is_subscribed(&EventKind::Modify(ModifyKind::Name(
            RenameMode::Both
        ))));
        assert!(is_subscribed(&EventKind::Create(CreateKind::File)));
    }
}
