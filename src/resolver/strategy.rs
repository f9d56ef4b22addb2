//! Resolution strategies: turning a dependency manifest into loadable code locations.

use crate::error::ResolutionError;
use crate::resolver::cache::{ArtifactCache, PurgeOutcome};
use crate::resolver::fetch::ArtifactFetcher;
use crate::resolver::manifest::ManifestFile;
use crate::resolver::{CodeLocation, Coordinate, DependencyManifest, RepositoryDescriptor};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which strategy builds the dependency set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverKind {
    /// Driven by the project-local `rivet.toml`.
    #[default]
    ManifestFile,
    /// Driven by the repositories and dependencies declared in configuration.
    RepositoryList,
}

/// Resolves coordinates through the cache, falling back to the declared repositories.
pub struct DependencyResolver {
    cache: ArtifactCache,
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl DependencyResolver {
    pub fn new(cache: ArtifactCache, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self { cache, fetcher }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Resolve one coordinate. A cache hit never touches the repositories; otherwise the
    /// repositories are consulted in order and the first one that has the artifact wins.
    pub fn resolve_coordinate(
        &self,
        repositories: &[RepositoryDescriptor],
        coordinate: &Coordinate,
    ) -> Result<PathBuf, ResolutionError> {
        if let Some(path) = self.cache.lookup(coordinate) {
            debug!(coordinate = %coordinate, "Artifact cache hit");
            return Ok(path);
        }

        let mut last_failure = None;
        for repository in repositories {
            match self.fetcher.fetch(repository, coordinate) {
                Ok(Some(bytes)) => {
                    info!(
                        coordinate = %coordinate,
                        repository = %repository.id,
                        bytes = bytes.len(),
                        "Fetched artifact"
                    );
                    return self.cache.store(coordinate, &bytes);
                }
                Ok(None) => {
                    debug!(coordinate = %coordinate, repository = %repository.id, "Artifact not in repository");
                }
                Err(e) => {
                    warn!(coordinate = %coordinate, repository = %repository.id, error = %e, "Repository fetch failed");
                    last_failure = Some(e);
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| ResolutionError::NotFound {
            coordinate: coordinate.clone(),
            repositories: repositories.iter().map(|r| r.id.clone()).collect(),
        }))
    }

    /// Resolve every dependency of a manifest, in manifest order.
    pub fn resolve_manifest(
        &self,
        manifest: &DependencyManifest,
    ) -> Result<Vec<CodeLocation>, ResolutionError> {
        manifest.validate()?;
        manifest
            .dependencies
            .iter()
            .map(|coordinate| {
                self.resolve_coordinate(&manifest.repositories, coordinate)
                    .map(|path| CodeLocation::Artifact {
                        coordinate: coordinate.clone(),
                        path,
                    })
            })
            .collect()
    }

    pub fn purge(&self, coordinate: &Coordinate) -> PurgeOutcome {
        self.cache.purge(coordinate)
    }
}

/// A way of producing the manifest-sourced part of a loading scope.
pub trait ResolutionStrategy: Send + Sync {
    fn kind(&self) -> ResolverKind;

    fn resolve(&self, manifest: &DependencyManifest) -> Result<Vec<CodeLocation>, ResolutionError>;
}

/// Reads the project-local manifest file and resolves it on top of the configured
/// repositories.
pub struct ManifestFileStrategy {
    resolver: Arc<DependencyResolver>,
}

impl ManifestFileStrategy {
    pub fn new(resolver: Arc<DependencyResolver>) -> Self {
        Self { resolver }
    }
}

impl ResolutionStrategy for ManifestFileStrategy {
    fn kind(&self) -> ResolverKind {
        ResolverKind::ManifestFile
    }

    fn resolve(&self, manifest: &DependencyManifest) -> Result<Vec<CodeLocation>, ResolutionError> {
        let Some(path) = manifest.manifest_file.as_deref() else {
            debug!("No manifest file configured, nothing to resolve");
            return Ok(Vec::new());
        };
        if !path.exists() {
            info!(manifest = %path.display(), "Manifest resolution enabled but manifest file does not exist");
            return Ok(Vec::new());
        }
        debug!(manifest = %path.display(), "Parsing manifest");
        let file = ManifestFile::load(path)?;
        self.resolver.resolve_manifest(&manifest.merged_with(file))
    }
}

/// Resolves the dependencies declared in configuration against the configured repository
/// list only.
pub struct RepositoryListStrategy {
    resolver: Arc<DependencyResolver>,
}

impl RepositoryListStrategy {
    pub fn new(resolver: Arc<DependencyResolver>) -> Self {
        Self { resolver }
    }
}

impl ResolutionStrategy for RepositoryListStrategy {
    fn kind(&self) -> ResolverKind {
        ResolverKind::RepositoryList
    }

    fn resolve(&self, manifest: &DependencyManifest) -> Result<Vec<CodeLocation>, ResolutionError> {
        self.resolver.resolve_manifest(manifest)
    }
}

/// Strategy for a configured resolver kind.
pub fn strategy_for(
    kind: ResolverKind,
    resolver: Arc<DependencyResolver>,
) -> Box<dyn ResolutionStrategy> {
    match kind {
        ResolverKind::ManifestFile => Box::new(ManifestFileStrategy::new(resolver)),
        ResolverKind::RepositoryList => Box::new(RepositoryListStrategy::new(resolver)),
    }
}
