//! Logging System
//!
//! Structured logging with the `tracing` crate. The library only emits events; the binary
//! installs the subscriber configured here.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file, both
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (if output is "file")
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Colored output (text format, terminal destinations only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_log_file() -> PathBuf {
    directories::ProjectDirs::from("", "", "rivet")
        .map(|dirs| dirs.data_local_dir().join("rivet.log"))
        .unwrap_or_else(|| PathBuf::from(".rivet/rivet.log"))
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

/// Where formatted events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
    /// Stderr and stdout.
    Both,
    File,
}

impl FromStr for LogTarget {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "stdout" => Ok(LogTarget::Stdout),
            "stderr" => Ok(LogTarget::Stderr),
            "both" => Ok(LogTarget::Both),
            "file" => Ok(LogTarget::File),
            other => Err(SessionError::ConfigError(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr', 'file', or 'both')",
                other
            ))),
        }
    }
}

/// Install the global subscriber.
///
/// Each setting is taken from the first of: `RIVET_LOG*` environment variables, `config`
/// (the binary folds CLI flags into it), built-in defaults. Fails if a subscriber is
/// already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), SessionError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);

    let filter = env_filter(config)?;
    let json = match std::env::var("RIVET_LOG_FORMAT").ok().as_deref() {
        Some(format @ ("json" | "text")) => format == "json",
        _ => match config.format.as_str() {
            "json" => true,
            "text" => false,
            other => {
                return Err(SessionError::ConfigError(format!(
                    "Invalid log format: {} (must be 'json' or 'text')",
                    other
                )))
            }
        },
    };
    let target: LogTarget = match std::env::var("RIVET_LOG_OUTPUT") {
        Ok(output) => output.parse()?,
        Err(_) => config.output.parse()?,
    };

    let writer = match target {
        LogTarget::File => BoxMakeWriter::new(Arc::new(open_log_file(&config.file)?)),
        LogTarget::Both => BoxMakeWriter::new(std::io::stderr.and(std::io::stdout)),
        LogTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = Registry::default().with(filter);
    let installed = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(config.color && target != LogTarget::File)
                    .with_writer(writer),
            )
            .try_init()
    };

    installed.map_err(|e| SessionError::ConfigError(format!("Failed to install logger: {}", e)))
}

fn open_log_file(path: &Path) -> Result<std::fs::File, SessionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            SessionError::ConfigError(format!("Failed to create log directory: {}", e))
        })?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SessionError::ConfigError(format!("Failed to open log file {:?}: {}", path, e)))
}

/// `RIVET_LOG` replaces everything; otherwise the configured level plus per-module
/// directives from the config and `RIVET_LOG_MODULES` (`module=level,...`).
fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, SessionError> {
    if let Ok(filter) = EnvFilter::try_from_env("RIVET_LOG") {
        return Ok(filter);
    }
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let from_env = std::env::var("RIVET_LOG_MODULES").unwrap_or_default();
    let env_directives = from_env
        .split(',')
        .filter_map(|spec| spec.split_once('='))
        .map(|(module, level)| (module.trim().to_string(), level.trim().to_string()));

    config
        .modules
        .iter()
        .map(|(module, level)| (module.clone(), level.clone()))
        .chain(env_directives)
        .try_fold(EnvFilter::new(&config.level), |filter, (module, level)| {
            let directive = format!("{}={}", module, level).parse().map_err(|e| {
                SessionError::ConfigError(format!("Invalid log directive '{}={}': {}", module, level, e))
            })?;
            Ok(filter.add_directive(directive))
        })
}
