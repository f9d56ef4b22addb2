//! Manifest Watcher
//!
//! Watches the project manifest and rebuilds the session context when it changes. Bursts of
//! filesystem events are debounced into a single rebuild.

use crate::error::SessionError;
use crate::resolver::MANIFEST_FILENAME;
use crate::session::Session;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Quiet period after the last manifest event before rebuilding.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// How often the loop checks whether it should stop.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ManifestWatcher {
    manifest: PathBuf,
    running: Arc<RwLock<bool>>,
    thread: Option<JoinHandle<()>>,
}

impl ManifestWatcher {
    /// Watch `<project>/rivet.toml` for `session`.
    pub fn start(session: Session, debounce: Duration) -> Result<Self, SessionError> {
        let project = session.project_dir().ok_or_else(|| {
            SessionError::PrematureInit("project directory is not available yet".to_string())
        })?;
        let project = dunce::canonicalize(&project).unwrap_or(project);
        let manifest = project.join(MANIFEST_FILENAME);

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = tx.send(res) {
                error!("Error sending watch event: {}", e);
            }
        })
        .map_err(|e| watch_error("create watcher", e))?;
        watcher
            .watch(&project, RecursiveMode::NonRecursive)
            .map_err(|e| watch_error("watch project directory", e))?;
        info!(manifest = %manifest.display(), "Watching manifest");

        let running = Arc::new(RwLock::new(true));
        let thread = {
            let running = running.clone();
            let manifest = manifest.clone();
            std::thread::Builder::new()
                .name("rivet-manifest-watch".to_string())
                .spawn(move || {
                    // The watcher lives as long as the loop.
                    let _watcher = watcher;
                    watch_loop(&session, &manifest, &rx, &running, debounce);
                })?
        };

        Ok(Self {
            manifest,
            running,
            thread: Some(thread),
        })
    }

    pub fn manifest(&self) -> &Path {
        &self.manifest
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    pub fn stop(&mut self) {
        *self.running.write() = false;
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ManifestWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_error(action: &str, e: notify::Error) -> SessionError {
    SessionError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("Failed to {}: {}", action, e),
    ))
}

fn watch_loop(
    session: &Session,
    manifest: &Path,
    rx: &mpsc::Receiver<notify::Result<Event>>,
    running: &RwLock<bool>,
    debounce: Duration,
) {
    let mut pending_since: Option<Instant> = None;

    while *running.read() {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(event)) => {
                if touches_manifest(&event, manifest) {
                    debug!(kind = ?event.kind, "Manifest changed");
                    pending_since = Some(Instant::now());
                }
            }
            Ok(Err(e)) => warn!("Watch error: {}", e),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                error!("Watcher channel disconnected");
                break;
            }
        }

        if pending_since.is_some_and(|since| since.elapsed() >= debounce) {
            pending_since = None;
            info!("Manifest changed, rebuilding context");
            if let Err(e) = session.rebuild_context() {
                warn!(error = %e, "Could not schedule context rebuild");
            }
        }
    }
}

/// Whether `event` creates, modifies or removes the manifest file.
pub fn touches_manifest(event: &Event, manifest: &Path) -> bool {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    relevant
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == manifest.file_name() && path.parent() == manifest.parent())
}
