// src/watch/location.rs

//! Watched locations and the registry that fans events out to them.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, error, trace};

use crate::errors::Result;
use crate::types::{ChangeKind, RawEvent};
use crate::watch::expiring_set::ExpiringSet;
use crate::watch::path_utils::{relative_to, resolve_location, to_slash_string};

/// Default duplicate-suppression window of a [`WatchedLocation`].
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(500);

/// Listener callback. Receives the changed path relative to the watcher's
/// base directory.
pub type FileListener = Arc<dyn Fn(&Path, ChangeKind) -> anyhow::Result<()> + Send + Sync>;

/// A subtree of the base directory with its own listeners.
///
/// Each location keeps a short-lived record of the paths it has recently
/// notified about, so the several low-level notifications an OS emits for a
/// single logical write reach the listeners once.
pub struct WatchedLocation {
    /// Relative to the base directory; empty for the root location.
    path: PathBuf,
    recently_notified: ExpiringSet<String>,
    listeners: RwLock<Vec<FileListener>>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for WatchedLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchedLocation")
            .field("path", &self.path)
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl WatchedLocation {
    fn new(path: PathBuf, dedup_window: Duration, closed: Arc<AtomicBool>) -> Self {
        Self {
            path,
            recently_notified: ExpiringSet::new(dedup_window),
            listeners: RwLock::new(Vec::new()),
            closed,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a listener. Safe to call while events are being dispatched.
    pub fn listen<F>(&self, listener: F)
    where
        F: Fn(&Path, ChangeKind) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listen_shared(Arc::new(listener));
    }

    pub fn listen_shared(&self, listener: FileListener) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    pub fn listener_count(&self) -> usize {
        match self.listeners.read() {
            Ok(listeners) => listeners.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Record that `file` (relative to the base) changed just now, so that a
    /// notification for it inside the window is suppressed.
    pub fn record_change(&self, file: &str) {
        self.recently_notified.insert(file.replace('\\', "/"));
    }

    /// Claim the notification slot for `file`. `false` means the same path
    /// was already notified inside the window.
    pub fn admit(&self, file: &Path) -> bool {
        self.recently_notified.insert(to_slash_string(file))
    }

    /// Handle an event for `file` (relative to the base directory).
    pub fn on_event(&self, file: &Path, kind: ChangeKind) {
        if !self.admit(file) {
            trace!(location = ?self.path, ?file, %kind, "suppressed duplicate notification");
            return;
        }
        self.notify_listeners(file, kind);
    }

    /// Invoke every listener in turn. A failing or panicking listener is
    /// logged and does not affect the others.
    ///
    /// The closed flag is read right before each call, so once
    /// [`LocationRegistry::mark_closed`] returns no further listener starts.
    /// A call that was already running at that moment is left to finish.
    pub fn notify_listeners(&self, file: &Path, kind: ChangeKind) {
        let listeners: Vec<FileListener> = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        for listener in listeners {
            if self.closed.load(Ordering::SeqCst) {
                debug!(?file, "watcher closed; skipping remaining listeners");
                return;
            }
            match catch_unwind(AssertUnwindSafe(|| listener(file, kind))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(location = ?self.path, ?file, %kind, error = %err, "listener failed");
                }
                Err(_) => {
                    error!(location = ?self.path, ?file, %kind, "listener panicked");
                }
            }
        }
    }
}

/// An admitted event waiting to be handed to one location's listeners.
#[derive(Debug)]
pub struct Delivery {
    pub location: Arc<WatchedLocation>,
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl Delivery {
    pub fn deliver(self) {
        self.location.notify_listeners(&self.path, self.kind);
    }
}

/// All watched locations of one watcher, keyed by their base-relative path.
#[derive(Debug)]
pub struct LocationRegistry {
    base: PathBuf,
    locations: DashMap<PathBuf, Arc<WatchedLocation>>,
    dedup_window: Duration,
    closed: Arc<AtomicBool>,
}

impl LocationRegistry {
    /// Create the registry with its root location already in place.
    pub fn new(base: impl Into<PathBuf>, dedup_window: Duration) -> Self {
        let registry = Self {
            base: base.into(),
            locations: DashMap::new(),
            dedup_window,
            closed: Arc::new(AtomicBool::new(false)),
        };
        registry.location_for(PathBuf::new());
        registry
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Look up (or lazily create) the location for `path`.
    ///
    /// Absolute paths must be under the base directory; relative paths are
    /// relative to it. Concurrent callers for the same path get the same
    /// instance.
    pub fn get_watcher(&self, path: impl AsRef<Path>) -> Result<Arc<WatchedLocation>> {
        let relative = resolve_location(&self.base, path.as_ref())?;
        Ok(self.location_for(relative))
    }

    pub fn root(&self) -> Arc<WatchedLocation> {
        self.location_for(PathBuf::new())
    }

    fn location_for(&self, relative: PathBuf) -> Arc<WatchedLocation> {
        let location = self.locations.entry(relative.clone()).or_insert_with(|| {
            debug!(location = ?relative, "created watched location");
            Arc::new(WatchedLocation::new(
                relative,
                self.dedup_window,
                Arc::clone(&self.closed),
            ))
        });
        Arc::clone(location.value())
    }

    pub fn locations(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.locations.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// The base-relative file of `event` and every location whose subtree
    /// contains its directory.
    fn containing(&self, event: &RawEvent) -> Option<(PathBuf, Vec<Arc<WatchedLocation>>)> {
        let Some(file) = relative_to(&self.base, &event.path) else {
            debug!(path = ?event.path, base = ?self.base, "event outside base directory; discarded");
            return None;
        };
        if file.as_os_str().is_empty() {
            return None;
        }

        let directory = relative_to(&self.base, &event.directory)
            .unwrap_or_else(|| file.parent().map(Path::to_path_buf).unwrap_or_default());

        let locations = self
            .locations
            .iter()
            .filter(|entry| directory.starts_with(entry.key()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        Some((file, locations))
    }

    /// Admit `event` at every location containing its directory and return
    /// the resulting deliveries. Locations that saw the same path inside
    /// their window produce nothing.
    pub fn route(&self, event: &RawEvent) -> Vec<Delivery> {
        let Some((file, containing)) = self.containing(event) else {
            return Vec::new();
        };

        containing
            .into_iter()
            .filter(|location| {
                let admitted = location.admit(&file);
                if !admitted {
                    trace!(location = ?location.path(), ?file, "suppressed duplicate notification");
                }
                admitted
            })
            .map(|location| Delivery {
                location,
                path: file.clone(),
                kind: event.kind,
            })
            .collect()
    }

    /// Handle `event` at every containing location on the calling thread.
    pub fn dispatch(&self, event: &RawEvent) {
        if let Some((file, containing)) = self.containing(event) {
            for location in containing {
                location.on_event(&file, event.kind);
            }
        }
    }

    /// Stop all future listener invocations. Listener calls in progress are
    /// not interrupted.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Seen = Arc<Mutex<Vec<(PathBuf, ChangeKind)>>>;

    fn recorder(location: &WatchedLocation) -> Seen {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        location.listen(move |path, kind| {
            sink.lock().unwrap().push((path.to_path_buf(), kind));
            Ok(())
        });
        seen
    }

    fn event(base: &Path, rel: &str, kind: ChangeKind) -> RawEvent {
        let path = base.join(rel);
        let directory = path.parent().unwrap().to_path_buf();
        RawEvent {
            path,
            kind,
            directory,
        }
    }

    #[test]
    fn root_location_exists_from_the_start() {
        let registry = LocationRegistry::new("/tmp/root", DEFAULT_DEDUP_WINDOW);
        assert_eq!(registry.locations(), vec![PathBuf::new()]);
        assert!(Arc::ptr_eq(
            &registry.root(),
            &registry.get_watcher("/tmp/root").unwrap()
        ));
    }

    #[test]
    fn absolute_and_relative_lookups_share_an_instance() {
        let registry = LocationRegistry::new("/tmp/root", DEFAULT_DEDUP_WINDOW);
        let by_abs = registry.get_watcher("/tmp/root/sub").unwrap();
        let by_rel = registry.get_watcher("sub").unwrap();
        assert!(Arc::ptr_eq(&by_abs, &by_rel));
        assert_eq!(by_abs.path(), Path::new("sub"));
    }

    #[test]
    fn concurrent_creators_observe_one_location() {
        let registry = Arc::new(LocationRegistry::new("/tmp/root", DEFAULT_DEDUP_WINDOW));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_watcher("a/b").unwrap())
            })
            .collect();
        let locations: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(locations.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn duplicate_within_window_is_dropped() {
        let base = Path::new("/tmp/root");
        let registry = LocationRegistry::new(base, Duration::from_secs(60));
        let seen = recorder(&registry.root());

        for _ in 0..5 {
            registry.dispatch(&event(base, "a.txt", ChangeKind::Modify));
        }

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(PathBuf::from("a.txt"), ChangeKind::Modify)]
        );
    }

    #[test]
    fn path_is_delivered_again_after_the_window() {
        let base = Path::new("/tmp/root");
        let registry = LocationRegistry::new(base, Duration::from_millis(100));
        let seen = recorder(&registry.root());

        registry.dispatch(&event(base, "a.txt", ChangeKind::Modify));
        registry.dispatch(&event(base, "a.txt", ChangeKind::Modify));
        std::thread::sleep(Duration::from_millis(250));
        registry.dispatch(&event(base, "a.txt", ChangeKind::Modify));

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn fan_out_reaches_containing_locations_only() {
        let base = Path::new("/tmp/root");
        let registry = LocationRegistry::new(base, DEFAULT_DEDUP_WINDOW);
        let root = recorder(&registry.root());
        let src = recorder(&registry.get_watcher("src").unwrap());
        let nested = recorder(&registry.get_watcher("src/nested").unwrap());
        let docs = recorder(&registry.get_watcher("docs").unwrap());

        registry.dispatch(&event(base, "src/nested/deep/x.rs", ChangeKind::Create));
        registry.dispatch(&event(base, "src/lib.rs", ChangeKind::Modify));
        registry.dispatch(&event(base, "top.txt", ChangeKind::Delete));

        assert_eq!(root.lock().unwrap().len(), 3);
        assert_eq!(src.lock().unwrap().len(), 2);
        assert_eq!(
            *nested.lock().unwrap(),
            vec![(PathBuf::from("src/nested/deep/x.rs"), ChangeKind::Create)]
        );
        assert!(docs.lock().unwrap().is_empty());
    }

    #[test]
    fn sibling_with_common_prefix_is_not_contained() {
        let base = Path::new("/tmp/root");
        let registry = LocationRegistry::new(base, DEFAULT_DEDUP_WINDOW);
        let src = recorder(&registry.get_watcher("src").unwrap());

        registry.dispatch(&event(base, "src2/a.rs", ChangeKind::Create));

        assert!(src.lock().unwrap().is_empty());
    }

    #[test]
    fn event_for_the_base_itself_is_discarded() {
        let base = Path::new("/tmp/root");
        let registry = LocationRegistry::new(base, DEFAULT_DEDUP_WINDOW);
        let seen = recorder(&registry.root());

        registry.dispatch(&RawEvent {
            path: base.to_path_buf(),
            kind: ChangeKind::Delete,
            directory: PathBuf::from("/tmp"),
        });

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let base = Path::new("/tmp/root");
        let registry = LocationRegistry::new(base, DEFAULT_DEDUP_WINDOW);
        let root = registry.root();
        root.listen(|_, _| Err(anyhow::anyhow!("boom")));
        root.listen(|_, _| panic!("listener panic"));
        let seen = recorder(&root);

        registry.dispatch(&event(base, "a.txt", ChangeKind::Create));
        registry.dispatch(&event(base, "b.txt", ChangeKind::Create));

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn recorded_change_suppresses_next_notification() {
        let base = Path::new("/tmp/root");
        let registry = LocationRegistry::new(base, Duration::from_secs(60));
        let root = registry.root();
        let seen = recorder(&root);

        root.record_change("sub/a.txt");
        registry.dispatch(&event(base, "sub/a.txt", ChangeKind::Modify));

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn on_event_notifies_once_per_window() {
        let registry = LocationRegistry::new("/tmp/root", Duration::from_secs(60));
        let root = registry.root();
        let seen = recorder(&root);

        root.on_event(Path::new("z.txt"), ChangeKind::Modify);
        root.on_event(Path::new("z.txt"), ChangeKind::Modify);
        root.on_event(Path::new("other.txt"), ChangeKind::Create);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (PathBuf::from("z.txt"), ChangeKind::Modify),
                (PathBuf::from("other.txt"), ChangeKind::Create),
            ]
        );
    }

    #[test]
    fn closing_mid_delivery_skips_the_remaining_listeners() {
        let base = Path::new("/tmp/root");
        let registry = Arc::new(LocationRegistry::new(base, DEFAULT_DEDUP_WINDOW));
        let root = registry.root();
        let weak = Arc::downgrade(&registry);
        root.listen(move |_, _| {
            if let Some(registry) = weak.upgrade() {
                registry.mark_closed();
            }
            Ok(())
        });
        let seen = recorder(&root);

        registry.dispatch(&event(base, "a.txt", ChangeKind::Create));

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn closed_registry_stops_invoking_listeners() {
        let base = Path::new("/tmp/root");
        let registry = LocationRegistry::new(base, DEFAULT_DEDUP_WINDOW);
        let seen = recorder(&registry.root());

        registry.mark_closed();
        registry.dispatch(&event(base, "a.txt", ChangeKind::Create));

        assert!(seen.lock().unwrap().is_empty());
    }
}
