//! CLI help and command-name contract for logging and routing.

use crate::cli::parse::{CacheCommands, Commands, RepoCommands};

/// Command name string for log spans (e.g. "repos.add", "cache.list").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Repl { .. } => "repl".to_string(),
        Commands::Run { .. } => "run".to_string(),
        Commands::Test { .. } => "test".to_string(),
        Commands::Repos { command } => format!("repos.{}", repo_command_name(command)),
        Commands::Cache { command } => format!("cache.{}", cache_command_name(command)),
        Commands::Resolve { .. } => "resolve".to_string(),
    }
}

pub fn repo_command_name(command: &RepoCommands) -> &'static str {
    match command {
        RepoCommands::List { .. } => "list",
        RepoCommands::Add { .. } => "add",
        RepoCommands::Remove { .. } => "remove",
        RepoCommands::Reset => "reset",
    }
}

pub fn cache_command_name(command: &CacheCommands) -> &'static str {
    match command {
        CacheCommands::List => "list",
        CacheCommands::Purge { .. } => "purge",
    }
}

/// Commands understood inside the interactive session.
pub const REPL_HELP: &str = "\
Session commands:
  :help       Show this help
  :vars       Show the session bindings
  :restart    Rebuild the context from scratch
  :quit       Leave the session
Anything else is evaluated as a script.";
