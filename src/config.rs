//! Configuration System
//!
//! Session flags, resolver selection, autorun switches and logging, loaded from layered
//! sources with environment variable overrides and validated before use.

use crate::context::RebuildOptions;
use crate::logging::LoggingConfig;
use crate::resolver::{Coordinate, RepositoryDescriptor, ResolverKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

mod facade;
mod merge;
pub mod paths;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RivetConfig {
    /// Session behaviour
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Flags consumed by the session runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Resolve manifest dependencies on every rebuild.
    #[serde(default)]
    pub use_manifest_resolution: bool,

    #[serde(default)]
    pub resolver: ResolverKind,

    /// Append the project's build output directories to the loading scope.
    #[serde(default = "default_true")]
    pub include_local_build_output: bool,

    /// Build output directories, relative to the project directory.
    #[serde(default = "default_build_output_dirs")]
    pub build_output_dirs: Vec<String>,

    /// Where the global autorun script lives.
    #[serde(default)]
    pub install_dir: Option<PathBuf>,

    /// Project directory; the current directory when unset.
    #[serde(default)]
    pub project_dir: Option<PathBuf>,

    /// Base module directories of every loading scope.
    #[serde(default)]
    pub module_dirs: Vec<PathBuf>,

    /// Repositories for resolution. Empty means the persisted repository list.
    #[serde(default)]
    pub repositories: Vec<RepositoryDescriptor>,

    #[serde(default)]
    pub dependencies: Vec<Coordinate>,

    #[serde(default = "default_true")]
    pub autorun_global: bool,

    #[serde(default = "default_true")]
    pub autorun_project: bool,

    /// Artifact cache root; the per-user cache directory when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Rebuild the context when the project manifest changes.
    #[serde(default)]
    pub watch_manifest: bool,
}

fn default_true() -> bool {
    true
}

fn default_build_output_dirs() -> Vec<String> {
    crate::context::builder::DEFAULT_BUILD_OUTPUT_DIRS
        .iter()
        .map(|dir| dir.to_string())
        .collect()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            use_manifest_resolution: false,
            resolver: ResolverKind::default(),
            include_local_build_output: true,
            build_output_dirs: default_build_output_dirs(),
            install_dir: None,
            project_dir: None,
            module_dirs: Vec::new(),
            repositories: Vec::new(),
            dependencies: Vec::new(),
            autorun_global: true,
            autorun_project: true,
            cache_dir: None,
            watch_manifest: false,
        }
    }
}

impl SessionConfig {
    pub fn rebuild_options(&self) -> RebuildOptions {
        RebuildOptions {
            use_manifest_resolution: self.use_manifest_resolution,
            include_local_build_output: self.include_local_build_output,
        }
    }

    /// Validate session configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for dir in &self.build_output_dirs {
            if dir.trim().is_empty() {
                errors.push(ValidationError::Session(
                    "build output directory names cannot be empty".to_string(),
                ));
            }
        }

        let mut ids = HashSet::new();
        for repository in &self.repositories {
            if repository.id.trim().is_empty() {
                errors.push(ValidationError::Repository(
                    repository.address.clone(),
                    "repository id cannot be empty".to_string(),
                ));
            } else if !ids.insert(repository.id.as_str()) {
                errors.push(ValidationError::Repository(
                    repository.id.clone(),
                    "duplicate repository id".to_string(),
                ));
            }
            if repository.address.trim().is_empty() {
                errors.push(ValidationError::Repository(
                    repository.id.clone(),
                    "repository address cannot be empty".to_string(),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Session(String),
    Repository(String, String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Session(msg) => write!(f, "Session: {}", msg),
            ValidationError::Repository(id, msg) => write!(f, "Repository '{}': {}", id, msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl RivetConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = self.session.validate().err().unwrap_or_default();

        if !matches!(self.logging.format.as_str(), "json" | "text") {
            errors.push(ValidationError::Logging(format!(
                "invalid format '{}'",
                self.logging.format
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
