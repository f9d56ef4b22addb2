//! Dependency manifests: repository descriptors, declared coordinates and the
//! optional project-local `rivet.toml`.

use crate::error::ResolutionError;
use crate::resolver::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Name of the project-local manifest file.
pub const MANIFEST_FILENAME: &str = "rivet.toml";

/// A declared remote or local repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub id: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub address: String,
}

fn default_kind() -> String {
    "default".to_string()
}

impl RepositoryDescriptor {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            address: address.into(),
        }
    }

    /// Local directory for `file:` repositories.
    pub fn local_path(&self) -> Option<PathBuf> {
        self.address
            .strip_prefix("file://")
            .or_else(|| self.address.strip_prefix("file:"))
            .map(PathBuf::from)
    }
}

/// Ordered repositories plus the coordinates to resolve against them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyManifest {
    pub repositories: Vec<RepositoryDescriptor>,
    pub dependencies: Vec<Coordinate>,
    /// Project-local manifest file, read by the manifest-file strategy.
    pub manifest_file: Option<PathBuf>,
}

impl DependencyManifest {
    pub fn new(repositories: Vec<RepositoryDescriptor>, dependencies: Vec<Coordinate>) -> Self {
        Self {
            repositories,
            dependencies,
            manifest_file: None,
        }
    }

    pub fn with_manifest_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_file = Some(path.into());
        self
    }

    /// Repository ids must be unique within a manifest.
    pub fn validate(&self) -> Result<(), ResolutionError> {
        let mut seen = HashSet::new();
        for repository in &self.repositories {
            if !seen.insert(repository.id.as_str()) {
                return Err(ResolutionError::DuplicateRepository(repository.id.clone()));
            }
        }
        Ok(())
    }

    /// Merge a manifest file on top of this manifest. File repositories come first,
    /// repositories already declared under the same id are kept once.
    pub fn merged_with(&self, file: ManifestFile) -> DependencyManifest {
        let mut repositories = file.repositories;
        for repository in &self.repositories {
            if !repositories.iter().any(|r| r.id == repository.id) {
                repositories.push(repository.clone());
            }
        }
        let mut dependencies = file.dependencies;
        for coordinate in &self.dependencies {
            if !dependencies.contains(coordinate) {
                dependencies.push(coordinate.clone());
            }
        }
        DependencyManifest {
            repositories,
            dependencies,
            manifest_file: self.manifest_file.clone(),
        }
    }
}

/// On-disk representation of `rivet.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    #[serde(default)]
    pub repositories: Vec<RepositoryDescriptor>,
    #[serde(default)]
    pub dependencies: Vec<Coordinate>,
}

impl ManifestFile {
    pub fn load(path: &Path) -> Result<Self, ResolutionError> {
        let content = std::fs::read_to_string(path).map_err(|e| ResolutionError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ResolutionError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}
