// src/watch/watcher.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::errors::{Result, WatchError};
use crate::types::ChangeKind;
use crate::watch::location::{DEFAULT_DEDUP_WINDOW, LocationRegistry, WatchedLocation};
use crate::watch::notification_loop::{LoopContext, LoopStatus, NotificationLoop};
use crate::watch::registrar::WatchRegistrar;
use crate::watch::worker_pool::{MIN_WORKERS, WorkerPool};

/// Construction options for a [`FileWatcher`].
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Directory to watch. Must exist and be a directory.
    pub base: PathBuf,
    /// Register directories created while the watcher runs.
    pub auto_register: bool,
    /// Duplicate-suppression window of every watched location.
    pub dedup_window: Duration,
    /// Size of the worker pool (at least 2).
    pub workers: usize,
}

impl WatcherOptions {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            auto_register: true,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            workers: MIN_WORKERS,
        }
    }

    pub fn auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = enabled;
        self
    }

    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Recursive directory watcher.
///
/// Owns the OS registrations, the notification loop and the watched
/// locations. Lifecycle: construct, add listeners (any time), start the loop,
/// `join` until shutdown, `close`. Dropping the watcher closes it.
pub struct FileWatcher {
    base: PathBuf,
    ctx: Arc<LoopContext>,
    event_loop: NotificationLoop,
    closed: AtomicBool,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("base", &self.base)
            .field("loop", &self.event_loop.status())
            .field("registered", &self.ctx.registrar.len())
            .finish()
    }
}

impl FileWatcher {
    /// Validate the base directory and register it recursively.
    ///
    /// The notification loop is not started; see [`FileWatcher::spawn`].
    pub fn new(options: WatcherOptions) -> Result<Self> {
        let base = validate_base(&options.base)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let registrar = WatchRegistrar::new(events_tx)?;
        registrar.register_recursively(&base)?;

        let ctx = Arc::new(LoopContext {
            registrar,
            registry: LocationRegistry::new(base.clone(), options.dedup_window),
            pool: WorkerPool::new(options.workers),
            auto_register: options.auto_register,
        });

        info!(
            base = ?base,
            directories = ctx.registrar.len(),
            auto_register = options.auto_register,
            "file watcher ready"
        );

        Ok(Self {
            base,
            ctx,
            event_loop: NotificationLoop::new(events_rx),
            closed: AtomicBool::new(false),
        })
    }

    /// Construct the watcher and start its notification loop.
    pub fn spawn(options: WatcherOptions) -> Result<Self> {
        let watcher = Self::new(options)?;
        watcher.run_event_processing_loop()?;
        Ok(watcher)
    }

    /// Start draining notifications. Only one loop may ever run per watcher.
    pub fn run_event_processing_loop(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WatchError::Closed);
        }
        self.event_loop.start(Arc::clone(&self.ctx))
    }

    /// The canonical base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn status(&self) -> LoopStatus {
        self.event_loop.status()
    }

    pub fn register(&self, directory: &Path) -> Result<()> {
        self.ctx.registrar.register(directory).map(|_| ())
    }

    pub fn register_recursively(&self, root: &Path) -> Result<()> {
        self.ctx.registrar.register_recursively(root)
    }

    pub fn is_registered(&self, directory: &Path) -> bool {
        self.ctx.registrar.is_registered(directory)
    }

    pub fn registered_directories(&self) -> Vec<PathBuf> {
        self.ctx.registrar.registered_directories()
    }

    pub fn get_root_watcher(&self) -> Arc<WatchedLocation> {
        self.ctx.registry.root()
    }

    /// Location for `path`, absolute (under the base) or base-relative.
    pub fn get_watcher(&self, path: impl AsRef<Path>) -> Result<Arc<WatchedLocation>> {
        self.ctx.registry.get_watcher(path)
    }

    pub fn get_watcher_with<F>(&self, path: impl AsRef<Path>, listener: F) -> Result<Arc<WatchedLocation>>
    where
        F: Fn(&Path, ChangeKind) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let location = self.get_watcher(path)?;
        location.listen(listener);
        Ok(location)
    }

    pub fn with_root_watcher<F>(&self, listener: F) -> Arc<WatchedLocation>
    where
        F: Fn(&Path, ChangeKind) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let location = self.get_root_watcher();
        location.listen(listener);
        location
    }

    pub fn locations(&self) -> Vec<PathBuf> {
        self.ctx.registry.locations()
    }

    /// Wait for the notification loop to end. Errors if it was never started.
    pub async fn join(&self) -> Result<()> {
        debug!(base = ?self.base, "joining notification loop");
        self.event_loop.join().await
    }

    /// Shut the watcher down. Never fails and is safe to call repeatedly or
    /// on a watcher whose loop never started.
    ///
    /// Closing the notification service, stopping the worker pool and
    /// cancelling the loop are attempted independently; failures are logged.
    /// No listener is invoked after this returns.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.ctx.registry.mark_closed();

        let steps: [(&str, &dyn Fn() -> anyhow::Result<()>); 3] = [
            ("close notification service", &|| self.ctx.registrar.close()),
            ("stop worker pool", &|| self.ctx.pool.shutdown()),
            ("cancel notification loop", &|| self.event_loop.cancel()),
        ];
        for (index, (name, step)) in steps.iter().enumerate() {
            if let Err(err) = step() {
                error!(step = index + 1, action = %name, error = %err, "shutdown step failed");
            }
        }
        info!(base = ?self.base, "file watcher closed");
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn validate_base(base: &Path) -> Result<PathBuf> {
    let invalid = |reason: &str| WatchError::InvalidBasePath {
        path: base.to_path_buf(),
        reason: reason.to_string(),
    };

    if !base.is_absolute() {
        return Err(invalid("base path must be absolute"));
    }
    if !base.exists() {
        return Err(invalid("base path does not exist"));
    }
    if !base.is_dir() {
        return Err(invalid("base path is not a directory"));
    }

    // A stable form, so event paths and lookups agree.
    Ok(base.canonicalize()?)
}
