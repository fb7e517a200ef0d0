use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};
use watchrun::types::ChangeKind;
use watchrun::watch::FileListener;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Poll `condition` every 10ms until it holds or `limit` elapses.
///
/// Returns whether the condition was met.
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Listener that records every `(path, kind)` it is invoked with.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<(PathBuf, ChangeKind)>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A listener that appends to this recorder.
    pub fn listener(&self) -> FileListener {
        let events = Arc::clone(&self.events);
        Arc::new(move |path: &Path, kind: ChangeKind| {
            events
                .lock()
                .map_err(|_| anyhow::anyhow!("recorder poisoned"))?
                .push((path.to_path_buf(), kind));
            Ok(())
        })
    }

    pub fn events(&self) -> Vec<(PathBuf, ChangeKind)> {
        self.events.lock().expect("recorder poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("recorder poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events recorded for `path`.
    pub fn events_for(&self, path: impl AsRef<Path>) -> Vec<ChangeKind> {
        let path = path.as_ref();
        self.events()
            .into_iter()
            .filter(|(p, _)| p == path)
            .map(|(_, kind)| kind)
            .collect()
    }

    /// Wait (up to `limit`) until an event with `path` and `kind` arrives.
    pub async fn wait_for(&self, path: impl AsRef<Path>, kind: ChangeKind, limit: Duration) -> bool {
        let path = path.as_ref().to_path_buf();
        wait_until(limit, || self.events_for(&path).contains(&kind)).await
    }
}
