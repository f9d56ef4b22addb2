//! Error types for the Rivet scripting session runtime.

use crate::engine::EvaluationFault;
use crate::resolver::Coordinate;
use std::path::PathBuf;
use thiserror::Error;

/// Dependency resolution errors.
///
/// Always recoverable from the point of view of a context rebuild: the builder
/// reports them and continues without manifest-sourced code locations.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Artifact {coordinate} not found in repositories [{}]", .repositories.join(", "))]
    NotFound {
        coordinate: Coordinate,
        repositories: Vec<String>,
    },

    #[error("Failed to fetch {coordinate} from repository '{repository}': {message}")]
    Fetch {
        coordinate: Coordinate,
        repository: String,
        message: String,
    },

    #[error("Failed to cache {coordinate}: {source}")]
    Cache {
        coordinate: Coordinate,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest {path:?}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("Invalid coordinate '{0}' (expected group:artifact:version)")]
    InvalidCoordinate(String),

    #[error("Duplicate repository id '{0}' in manifest")]
    DuplicateRepository(String),

    #[error("Repository client error: {0}")]
    Client(String),
}

impl ResolutionError {
    /// The coordinate that triggered the failure, when there is one.
    pub fn coordinate(&self) -> Option<&Coordinate> {
        match self {
            ResolutionError::NotFound { coordinate, .. }
            | ResolutionError::Fetch { coordinate, .. }
            | ResolutionError::Cache { coordinate, .. } => Some(coordinate),
            _ => None,
        }
    }
}

/// Session-level errors surfaced to callers of [`crate::session::Session`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// A context was requested before the host finished its own startup.
    #[error("Context built before initialization completed: {0}")]
    PrematureInit(String),

    #[error("Script engine not ready: the session is still starting up, retry shortly")]
    EngineNotReady,

    #[error("{0}")]
    Evaluation(#[from] EvaluationFault),

    #[error("Execution queue is full: {0} is already waiting")]
    QueueFull(String),

    #[error("Task interrupted: {0}")]
    Interrupted(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Augmentation is only allowed before the first evaluation on a context.
    #[error("Context generation {0} has already been used and cannot be augmented")]
    ContextInUse(u64),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// The evaluation fault behind this error, if any.
    pub fn as_fault(&self) -> Option<&EvaluationFault> {
        match self {
            SessionError::Evaluation(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for SessionError {
    fn from(err: config::ConfigError) -> Self {
        SessionError::ConfigError(err.to_string())
    }
}
