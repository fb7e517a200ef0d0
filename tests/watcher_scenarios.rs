// tests/watcher_scenarios.rs

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use watchrun::types::ChangeKind;
use watchrun::watch::{FileWatcher, WatcherOptions};
use watchrun_test_utils::{EventRecorder, init_tracing, wait_until};

type TestResult = Result<(), Box<dyn Error>>;

const ARRIVAL: Duration = Duration::from_secs(3);

fn spawn_watcher(dir: &TempDir) -> Result<FileWatcher, Box<dyn Error>> {
    Ok(FileWatcher::spawn(WatcherOptions::new(dir.path()))?)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn created_file_is_reported_once() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let watcher = spawn_watcher(&dir)?;
    let recorder = EventRecorder::new();
    watcher.get_root_watcher().listen_shared(recorder.listener());

    fs::write(watcher.base().join("a.txt"), "hello")?;

    assert!(recorder.wait_for("a.txt", ChangeKind::Create, ARRIVAL).await);
    // The write's own modify notification falls inside the dedup window.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.events_for("a.txt"), vec![ChangeKind::Create]);

    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_subdirectory_is_registered_automatically() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let watcher = spawn_watcher(&dir)?;
    let recorder = EventRecorder::new();
    let listener = recorder.listener();
    watcher.with_root_watcher(move |path: &Path, kind| listener(path, kind));

    let sub = watcher.base().join("sub");
    fs::create_dir(&sub)?;
    fs::write(sub.join("b.txt"), "b")?;

    assert!(recorder.wait_for("sub/b.txt", ChangeKind::Create, ARRIVAL).await);
    assert!(wait_until(ARRIVAL, || watcher.is_registered(&sub)).await);

    let location = watcher.get_watcher("sub")?;
    assert_eq!(location.path(), Path::new("sub"));
    assert!(watcher.locations().contains(&PathBuf::from("sub")));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.events_for("sub/b.txt"), vec![ChangeKind::Create]);

    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_subdirectory_is_reported_but_not_watched_without_auto_register() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let watcher = FileWatcher::spawn(WatcherOptions::new(dir.path()).auto_register(false))?;
    let recorder = EventRecorder::new();
    watcher.get_root_watcher().listen_shared(recorder.listener());

    let sub = watcher.base().join("sub");
    fs::create_dir(&sub)?;
    assert!(recorder.wait_for("sub", ChangeKind::Create, ARRIVAL).await);

    fs::write(sub.join("b.txt"), "b")?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!watcher.is_registered(&sub));
    assert!(recorder.events_for("sub/b.txt").is_empty());
    assert_eq!(recorder.events_for("sub"), vec![ChangeKind::Create]);

    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listener_attached_with_get_watcher_with_sees_its_subtree() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    fs::create_dir(dir.path().join("sub"))?;
    fs::create_dir(dir.path().join("other"))?;

    let watcher = spawn_watcher(&dir)?;
    let root = EventRecorder::new();
    let sub = EventRecorder::new();
    watcher.get_root_watcher().listen_shared(root.listener());
    let forward = sub.listener();
    let location = watcher.get_watcher_with("sub", move |path: &Path, kind| forward(path, kind))?;
    assert_eq!(location.path(), Path::new("sub"));
    assert_eq!(location.listener_count(), 1);

    fs::write(watcher.base().join("sub/x.txt"), "x")?;
    fs::write(watcher.base().join("other/y.txt"), "y")?;

    assert!(sub.wait_for("sub/x.txt", ChangeKind::Create, ARRIVAL).await);
    assert!(root.wait_for("other/y.txt", ChangeKind::Create, ARRIVAL).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(sub.events_for("other/y.txt").is_empty());

    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rapid_writes_within_window_deliver_once() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("c.txt");
    fs::write(&file, "0")?;

    let watcher = FileWatcher::spawn(
        WatcherOptions::new(dir.path()).dedup_window(Duration::from_millis(500)),
    )?;
    let recorder = EventRecorder::new();
    watcher.get_root_watcher().listen_shared(recorder.listener());

    for i in 1..=5 {
        fs::write(&file, i.to_string())?;
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    assert!(wait_until(ARRIVAL, || !recorder.is_empty()).await);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(recorder.events_for("c.txt"), vec![ChangeKind::Modify]);

    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subtree_listener_sees_only_its_subtree() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    fs::create_dir_all(dir.path().join("sub/deep"))?;
    fs::create_dir(dir.path().join("other"))?;

    let watcher = spawn_watcher(&dir)?;
    let root = EventRecorder::new();
    let sub = EventRecorder::new();
    watcher.get_root_watcher().listen_shared(root.listener());
    watcher.get_watcher("sub")?.listen_shared(sub.listener());

    fs::write(watcher.base().join("sub/deep/x.txt"), "x")?;
    fs::write(watcher.base().join("other/y.txt"), "y")?;

    assert!(sub.wait_for("sub/deep/x.txt", ChangeKind::Create, ARRIVAL).await);
    assert!(root.wait_for("other/y.txt", ChangeKind::Create, ARRIVAL).await);
    assert!(root.wait_for("sub/deep/x.txt", ChangeKind::Create, ARRIVAL).await);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(sub.events_for("other/y.txt").is_empty());

    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleted_file_is_reported() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("gone.txt"), "bye")?;

    let watcher = spawn_watcher(&dir)?;
    let recorder = EventRecorder::new();
    watcher.get_root_watcher().listen_shared(recorder.listener());

    fs::remove_file(watcher.base().join("gone.txt"))?;

    assert!(recorder.wait_for("gone.txt", ChangeKind::Delete, ARRIVAL).await);
    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_listener_does_not_block_others() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let watcher = spawn_watcher(&dir)?;
    let recorder = EventRecorder::new();

    let root = watcher.get_root_watcher();
    root.listen(|_path: &Path, _kind| Err(anyhow::anyhow!("listener exploded")));
    root.listen(|_path: &Path, _kind| -> anyhow::Result<()> { panic!("listener panicked") });
    root.listen_shared(recorder.listener());

    fs::write(watcher.base().join("one.txt"), "1")?;
    assert!(recorder.wait_for("one.txt", ChangeKind::Create, ARRIVAL).await);

    fs::write(watcher.base().join("two.txt"), "2")?;
    assert!(recorder.wait_for("two.txt", ChangeKind::Create, ARRIVAL).await);

    watcher.close();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removed_directory_is_unregistered() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    fs::create_dir(dir.path().join("tmp"))?;

    let watcher = spawn_watcher(&dir)?;
    let tmp = watcher.base().join("tmp");
    assert!(watcher.is_registered(&tmp));

    fs::remove_dir(&tmp)?;

    assert!(wait_until(ARRIVAL, || !watcher.is_registered(&tmp)).await);
    assert!(watcher.is_registered(watcher.base()));

    watcher.close();
    Ok(())
}
