//! Persisted repository configuration.
//!
//! Repositories are stored as a JSON list of `{id, kind, address}` objects. Anything that
//! does not parse as that list is treated as "no configuration" and replaced by the default
//! set.

use crate::error::SessionError;
use crate::resolver::RepositoryDescriptor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CENTRAL_REPOSITORY_URL: &str = "https://repo1.maven.org/maven2/";

/// The default repository set: the user's local Maven-layout repository, then central.
pub fn default_repositories() -> Vec<RepositoryDescriptor> {
    let home = directories::BaseDirs::new()
        .map(|base| base.home_dir().to_path_buf())
        .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let local = home.join(".m2").join("repository");
    vec![
        RepositoryDescriptor::new("local", "default", format!("file:{}", local.display())),
        RepositoryDescriptor::new("central", "default", CENTRAL_REPOSITORY_URL),
    ]
}

/// Serialize repositories to their persisted JSON form.
pub fn to_json(repositories: &[RepositoryDescriptor]) -> String {
    // A list of plain string structs always serializes.
    serde_json::to_string_pretty(repositories).unwrap_or_else(|_| "[]".to_string())
}

/// Parse persisted repositories. Malformed input yields `None`.
pub fn from_json(json: &str) -> Option<Vec<RepositoryDescriptor>> {
    match serde_json::from_str::<Vec<RepositoryDescriptor>>(json) {
        Ok(repositories) => Some(repositories),
        Err(e) => {
            debug!(error = %e, "Malformed repository configuration");
            None
        }
    }
}

/// Parse persisted repositories, falling back to [`default_repositories`].
pub fn from_json_or_default(json: &str) -> Vec<RepositoryDescriptor> {
    from_json(json).unwrap_or_else(default_repositories)
}

/// File-backed repository list.
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    path: PathBuf,
}

impl RepositoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<config dir>/rivet/repositories.json`.
    pub fn default_location() -> Option<Self> {
        crate::config::paths::config_dir().map(|dir| Self::new(dir.join("repositories.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the repository list. A missing file yields the defaults; a malformed file is
    /// replaced by the defaults.
    pub fn load(&self) -> Result<Vec<RepositoryDescriptor>, SessionError> {
        if !self.path.exists() {
            return Ok(default_repositories());
        }
        let content = std::fs::read_to_string(&self.path)?;
        match from_json(&content) {
            Some(repositories) => Ok(repositories),
            None => {
                warn!(
                    path = %self.path.display(),
                    "Repository configuration is malformed, restoring defaults"
                );
                let defaults = default_repositories();
                self.save(&defaults)?;
                Ok(defaults)
            }
        }
    }

    pub fn save(&self, repositories: &[RepositoryDescriptor]) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, to_json(repositories))?;
        debug!(path = %self.path.display(), count = repositories.len(), "Saved repositories");
        Ok(())
    }

    /// Append a repository. Ids must stay unique.
    pub fn add(&self, repository: RepositoryDescriptor) -> Result<Vec<RepositoryDescriptor>, SessionError> {
        let mut repositories = self.load()?;
        if repositories.iter().any(|r| r.id == repository.id) {
            return Err(crate::error::ResolutionError::DuplicateRepository(repository.id).into());
        }
        repositories.push(repository);
        self.save(&repositories)?;
        Ok(repositories)
    }

    /// Remove a repository by id. Returns whether it was present.
    pub fn remove(&self, id: &str) -> Result<bool, SessionError> {
        let mut repositories = self.load()?;
        let before = repositories.len();
        repositories.retain(|r| r.id != id);
        let removed = repositories.len() != before;
        if removed {
            self.save(&repositories)?;
        }
        Ok(removed)
    }

    pub fn reset(&self) -> Result<Vec<RepositoryDescriptor>, SessionError> {
        let defaults = default_repositories();
        self.save(&defaults)?;
        Ok(defaults)
    }
}
