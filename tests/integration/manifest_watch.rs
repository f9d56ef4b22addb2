//! Manifest watching triggers context rebuilds

use crate::integration::test_utils::test_session;
use rivet::config::SessionConfig;
use rivet::resolver::MANIFEST_FILENAME;
use rivet::watch::ManifestWatcher;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[test]
fn test_manifest_change_rebuilds_context() {
    let project = TempDir::new().unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());
    let initial = session.rebuild_context_blocking().unwrap();

    let mut watcher = ManifestWatcher::start(session.clone(), Duration::from_millis(50)).unwrap();
    assert!(watcher.is_running());
    assert!(watcher.manifest().ends_with(MANIFEST_FILENAME));

    std::fs::write(project.path().join("notes.txt"), "unrelated").unwrap();
    std::fs::write(project.path().join(MANIFEST_FILENAME), "dependencies = []\n").unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut generation = initial;
    while generation == initial && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
        generation = session.context().map(|c| c.generation()).unwrap_or(initial);
    }
    watcher.stop();

    assert!(generation > initial);
    assert!(!watcher.is_running());
}
