//! CLI parse: clap types for Rivet. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rivet CLI - Interactive Rhai scripting sessions
#[derive(Parser)]
#[command(name = "rivet")]
#[command(about = "Interactive Rhai scripting sessions with dependency resolution")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace (project) directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive session
    Repl {
        /// Rebuild the context whenever the project manifest changes
        #[arg(long)]
        watch: bool,
    },
    /// Evaluate a script file in a fresh session
    Run {
        /// Script to evaluate
        file: PathBuf,
    },
    /// Run test scripts and print a summary
    Test {
        /// Test scripts; each file is one test named after its file stem
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Manage the persisted repository list
    Repos {
        #[command(subcommand)]
        command: RepoCommands,
    },
    /// Inspect or purge the artifact cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Resolve the project's dependencies and list the resulting code locations
    Resolve {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum RepoCommands {
    /// List repositories in resolution order
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Append a repository
    Add {
        /// Unique repository id
        id: String,
        /// Repository address (http(s):// URL or file: path)
        address: String,
        /// Repository layout kind
        #[arg(long, default_value = "default")]
        kind: String,
    },
    /// Remove a repository by id
    Remove {
        id: String,
    },
    /// Restore the default repository list
    Reset,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List cached artifacts
    List,
    /// Remove one cached artifact
    Purge {
        /// Coordinate (group:artifact:version)
        coordinate: String,
    },
}
