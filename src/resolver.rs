//! Dependency Resolver
//!
//! Turns a dependency manifest (ordered repositories plus `group:artifact:version`
//! coordinates) into an ordered list of loadable code locations. Artifacts are cached by
//! coordinate and fetched from the first repository that has them.

pub mod cache;
pub mod coordinate;
pub mod fetch;
pub mod manifest;
pub mod repositories;
pub mod strategy;

pub use cache::{ArtifactCache, CachedArtifact, PurgeOutcome};
pub use coordinate::Coordinate;
pub use fetch::{ArtifactFetcher, HttpFetcher};
pub use manifest::{DependencyManifest, ManifestFile, RepositoryDescriptor, MANIFEST_FILENAME};
pub use repositories::RepositoryStore;
pub use strategy::{strategy_for, DependencyResolver, ResolutionStrategy, ResolverKind};

use std::path::{Path, PathBuf};

/// A location the script engine can load modules from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeLocation {
    /// A directory of `.rhai` module files, addressed by relative path.
    Directory(PathBuf),
    /// A single resolved artifact, importable by its artifact name.
    Artifact { coordinate: Coordinate, path: PathBuf },
}

impl CodeLocation {
    pub fn path(&self) -> &Path {
        match self {
            CodeLocation::Directory(path) => path,
            CodeLocation::Artifact { path, .. } => path,
        }
    }
}
