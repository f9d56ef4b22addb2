//! Context construction.
//!
//! The builder is the only place where loading scopes are assembled and engines created. It
//! never mutates the active context: every rebuild produces a fresh [`Context`] with the next
//! generation.

use crate::context::{Context, LoadingScope};
use crate::engine::HostBindings;
use crate::error::{ResolutionError, SessionError};
use crate::report::Transcript;
use crate::resolver::{CodeLocation, DependencyManifest, ResolutionStrategy, MANIFEST_FILENAME};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default build output directories appended to the loading scope, relative to the project.
pub const DEFAULT_BUILD_OUTPUT_DIRS: [&str; 2] = ["build/main", "build/test"];

/// Per-rebuild switches taken from the session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildOptions {
    pub use_manifest_resolution: bool,
    pub include_local_build_output: bool,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            use_manifest_resolution: false,
            include_local_build_output: true,
        }
    }
}

/// Supplies the project directory. `None` means the host has not finished starting up.
pub trait ProjectDirSupplier: Send + Sync {
    fn project_dir(&self) -> Option<PathBuf>;
}

impl<F> ProjectDirSupplier for F
where
    F: Fn() -> Option<PathBuf> + Send + Sync,
{
    fn project_dir(&self) -> Option<PathBuf> {
        self()
    }
}

/// Receives resolution failures. They never abort a rebuild.
pub trait ResolutionListener: Send + Sync {
    fn resolution_failed(&self, error: &ResolutionError);
}

/// Listener that alerts the user through the session transcript.
pub struct TranscriptResolutionListener {
    transcript: Arc<dyn Transcript>,
}

impl TranscriptResolutionListener {
    pub fn new(transcript: Arc<dyn Transcript>) -> Self {
        Self { transcript }
    }
}

impl ResolutionListener for TranscriptResolutionListener {
    fn resolution_failed(&self, error: &ResolutionError) {
        let message = match error.coordinate() {
            Some(coordinate) => format!("Failed to resolve dependency: {} ({})", coordinate, error),
            None => format!("Failed to resolve dependencies: {}", error),
        };
        self.transcript.on_warning(&message);
    }
}

pub struct ContextBuilder {
    project_dir: Arc<dyn ProjectDirSupplier>,
    strategy: Box<dyn ResolutionStrategy>,
    listener: Arc<dyn ResolutionListener>,
    build_output_dirs: Vec<String>,
    generation: AtomicU64,
}

impl ContextBuilder {
    pub fn new(
        project_dir: Arc<dyn ProjectDirSupplier>,
        strategy: Box<dyn ResolutionStrategy>,
        listener: Arc<dyn ResolutionListener>,
    ) -> Self {
        Self {
            project_dir,
            strategy,
            listener,
            build_output_dirs: DEFAULT_BUILD_OUTPUT_DIRS.iter().map(|d| d.to_string()).collect(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_build_output_dirs(mut self, dirs: Vec<String>) -> Self {
        self.build_output_dirs = dirs;
        self
    }

    /// Generation of the last context built, 0 before the first build.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn project_dir(&self) -> Option<PathBuf> {
        self.project_dir.project_dir()
    }

    /// Build a new context on top of `parent`.
    pub fn rebuild(
        &self,
        parent: &LoadingScope,
        manifest: &DependencyManifest,
        bindings: &HostBindings,
        options: RebuildOptions,
    ) -> Result<Context, SessionError> {
        let project = self.require_project_dir()?;

        let mut scope = parent.clone();
        if options.include_local_build_output {
            for dir in self.local_build_output(&project) {
                debug!(dir = %dir.display(), "Adding build output to loading scope");
                scope.push(CodeLocation::Directory(dir));
            }
        }

        if options.use_manifest_resolution {
            match self.resolve_in(&project, manifest) {
                Ok(locations) => scope.extend(locations),
                Err(e) => {
                    warn!(error = %e, "Continuing without manifest dependencies");
                    self.listener.resolution_failed(&e);
                }
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            generation,
            locations = scope.len(),
            project = %project.display(),
            "Built execution context"
        );
        Ok(Context::new(generation, scope, bindings))
    }

    /// Resolve `manifest` with the configured strategy, without building a context. The
    /// project manifest file is used when the manifest names none.
    pub fn resolve(&self, manifest: &DependencyManifest) -> Result<Vec<CodeLocation>, SessionError> {
        let project = self.require_project_dir()?;
        Ok(self.resolve_in(&project, manifest)?)
    }

    fn resolve_in(
        &self,
        project: &Path,
        manifest: &DependencyManifest,
    ) -> Result<Vec<CodeLocation>, ResolutionError> {
        let manifest = if manifest.manifest_file.is_some() {
            manifest.clone()
        } else {
            manifest.clone().with_manifest_file(project.join(MANIFEST_FILENAME))
        };
        let locations = self.strategy.resolve(&manifest)?;
        info!(
            strategy = ?self.strategy.kind(),
            resolved = locations.len(),
            "Resolved manifest dependencies"
        );
        Ok(locations)
    }

    fn require_project_dir(&self) -> Result<PathBuf, SessionError> {
        self.project_dir.project_dir().ok_or_else(|| {
            SessionError::PrematureInit("project directory is not available yet".to_string())
        })
    }

    fn local_build_output(&self, project: &Path) -> Vec<PathBuf> {
        self.build_output_dirs
            .iter()
            .map(|dir| project.join(dir))
            .filter(|dir| dir.is_dir())
            .map(|dir| dunce::canonicalize(&dir).unwrap_or(dir))
            .collect()
    }
}
