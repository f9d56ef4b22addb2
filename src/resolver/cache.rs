//! Content-addressed artifact cache.
//!
//! Layout: `<root>/<group as path>/<artifact>/<version>/<artifact>-<version>.rhai`. An entry is
//! written once; writers stage into a temp file next to the target and persist atomically so a
//! concurrent resolver never observes a partial file.

use crate::error::ResolutionError;
use crate::resolver::Coordinate;
use parking_lot::{const_mutex, Mutex};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Paths whose deletion failed and must be retried when the process exits.
static DEFERRED_DELETIONS: Mutex<Vec<PathBuf>> = const_mutex(Vec::new());

/// Register a path for deletion at process exit.
pub fn defer_deletion(path: PathBuf) {
    let mut pending = DEFERRED_DELETIONS.lock();
    if !pending.contains(&path) {
        pending.push(path);
    }
}

/// Paths currently scheduled for deletion at exit.
pub fn deferred_deletions() -> Vec<PathBuf> {
    DEFERRED_DELETIONS.lock().clone()
}

/// Delete everything scheduled with [`defer_deletion`]. Returns the number of paths removed.
/// Called from session shutdown and from the binary before it exits.
pub fn run_deferred_deletions() -> usize {
    let pending: Vec<PathBuf> = std::mem::take(&mut *DEFERRED_DELETIONS.lock());
    let mut removed = 0;
    for path in pending {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Deferred deletion failed"),
        }
    }
    removed
}

/// Result of a cache purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOutcome {
    Removed,
    NotCached,
    /// Deletion failed; the file is removed at process exit instead.
    Deferred,
}

/// A cached artifact, as listed by [`ArtifactCache::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default cache root: `$XDG_CACHE_HOME/rivet/artifacts` (platform equivalent elsewhere),
    /// falling back to `~/.rivet/cache`.
    pub fn default_root() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("", "", "rivet") {
            return dirs.cache_dir().join("artifacts");
        }
        directories::BaseDirs::new()
            .map(|base| base.home_dir().join(".rivet").join("cache"))
            .unwrap_or_else(|| PathBuf::from(".rivet/cache"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache location of a coordinate. Depends only on the coordinate.
    pub fn path_for(&self, coordinate: &Coordinate) -> PathBuf {
        self.root.join(coordinate.relative_path())
    }

    /// Cached file for the coordinate, if present.
    pub fn lookup(&self, coordinate: &Coordinate) -> Option<PathBuf> {
        let path = self.path_for(coordinate);
        path.is_file().then_some(path)
    }

    /// Store artifact bytes for a coordinate. If another writer got there first the existing
    /// entry is kept.
    pub fn store(&self, coordinate: &Coordinate, bytes: &[u8]) -> Result<PathBuf, ResolutionError> {
        let target = self.path_for(coordinate);
        let cache_err = |source| ResolutionError::Cache {
            coordinate: coordinate.clone(),
            source,
        };
        let parent = target.parent().unwrap_or(self.root.as_path());
        std::fs::create_dir_all(parent).map_err(cache_err)?;

        let mut staged = NamedTempFile::new_in(parent).map_err(cache_err)?;
        staged.write_all(bytes).map_err(cache_err)?;
        staged.flush().map_err(cache_err)?;

        if target.is_file() {
            debug!(coordinate = %coordinate, "Artifact cached concurrently, discarding staged copy");
            return Ok(target);
        }
        staged.persist(&target).map_err(|e| cache_err(e.error))?;
        debug!(coordinate = %coordinate, path = %target.display(), "Cached artifact");
        Ok(target)
    }

    /// Remove a cached artifact. A failed delete is deferred to process exit rather than
    /// reported.
    pub fn purge(&self, coordinate: &Coordinate) -> PurgeOutcome {
        let path = self.path_for(coordinate);
        if !path.exists() {
            return PurgeOutcome::NotCached;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(coordinate = %coordinate, "Purged cached artifact");
                PurgeOutcome::Removed
            }
            Err(e) => {
                info!(
                    coordinate = %coordinate,
                    error = %e,
                    "Failed to delete cached artifact, it will be purged on exit"
                );
                defer_deletion(path);
                PurgeOutcome::Deferred
            }
        }
    }

    /// All cached artifacts below the root, sorted by path.
    pub fn entries(&self) -> Vec<CachedArtifact> {
        if !self.root.exists() {
            return Vec::new();
        }
        let mut entries: Vec<CachedArtifact> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!(error = %e, "Failed to read cache entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path().extension().and_then(|x| x.to_str())
                    == Some(crate::resolver::coordinate::ARTIFACT_EXTENSION)
            })
            .map(|e| CachedArtifact {
                size: e.metadata().map(|m| m.len()).unwrap_or(0),
                path: e.into_path(),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }
}
