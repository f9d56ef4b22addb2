//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::SessionError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &SessionError) -> String {
    match e {
        SessionError::PrematureInit(_) => format!("{} (is --workspace a directory?)", e),
        SessionError::ConfigError(msg) => format!("Invalid configuration: {}", msg),
        _ => e.to_string(),
    }
}
