//! Shared test utilities for integration tests
//!
//! Provides centralized setup/teardown for XDG directories and other test resources
//! to avoid code duplication and ensure consistent test isolation.

use rivet::config::SessionConfig;
use rivet::error::ResolutionError;
use rivet::report::MemoryTranscript;
use rivet::resolver::{ArtifactCache, ArtifactFetcher, Coordinate, RepositoryDescriptor};
use rivet::session::{Session, SessionComponents};
use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Serializes every test that touches process-wide environment variables.
static XDG_ENV_MUTEX: Mutex<()> = Mutex::new(());

const ISOLATED_VARS: [&str; 3] = ["HOME", "XDG_CONFIG_HOME", "XDG_DATA_HOME"];

/// Saved values of [`ISOLATED_VARS`], put back on drop so a panicking test still restores
/// them.
struct EnvRestore(Vec<(&'static str, Option<OsString>)>);

impl EnvRestore {
    fn capture() -> Self {
        Self(
            ISOLATED_VARS
                .iter()
                .map(|name| (*name, std::env::var_os(name)))
                .collect(),
        )
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (name, value) in &self.0 {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with `XDG_CONFIG_HOME` pointing at `test_dir`, and `XDG_DATA_HOME` and `HOME` at
/// subdirectories of it. Rivet's per-user files (`rivet/config.toml`,
/// `rivet/repositories.json`) then land in `test_dir/rivet`.
pub fn with_xdg_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = XDG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let _restore = EnvRestore::capture();

    let data_home = test_dir.path().join("data");
    let home = test_dir.path().join("home");
    std::fs::create_dir_all(&data_home).unwrap();
    std::fs::create_dir_all(&home).unwrap();

    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path());
    std::env::set_var("XDG_DATA_HOME", &data_home);

    f()
}

/// Fetcher serving artifacts from memory and counting every call.
#[derive(Default)]
pub struct MemoryFetcher {
    artifacts: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    pub fn with_artifact(mut self, coordinate: &str, body: &str) -> Self {
        self.artifacts.insert(coordinate.to_string(), body.as_bytes().to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ArtifactFetcher for MemoryFetcher {
    fn fetch(
        &self,
        _repository: &RepositoryDescriptor,
        coordinate: &Coordinate,
    ) -> Result<Option<Vec<u8>>, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.artifacts.get(&coordinate.to_string()).cloned())
    }
}

/// Session over `project` with an in-memory transcript and a fetcher that finds nothing.
pub fn test_session(project: &TempDir, config: SessionConfig) -> (Session, Arc<MemoryTranscript>) {
    test_session_with(project, config, Arc::new(MemoryFetcher::default()))
}

pub fn test_session_with(
    project: &TempDir,
    config: SessionConfig,
    fetcher: Arc<dyn ArtifactFetcher>,
) -> (Session, Arc<MemoryTranscript>) {
    let transcript = Arc::new(MemoryTranscript::new());
    let project_dir = project.path().to_path_buf();
    let components = SessionComponents {
        fetcher,
        cache: ArtifactCache::new(project.path().join(".cache")),
        listener: None,
        project_dir: Arc::new(move || Some(project_dir.clone())),
        repositories: Vec::new(),
    };
    (
        Session::with_components(config, transcript.clone(), components),
        transcript,
    )
}
