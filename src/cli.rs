//! CLI domain: parse, route, help, output, and presentation only.
//! No session orchestration; single route table dispatches to session services.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::{cache_command_name, command_name, repo_command_name, REPL_HELP};
pub use output::map_error;
pub use parse::{CacheCommands, Cli, Commands, RepoCommands};
pub use presentation::{
    format_cache_entries, format_code_locations_json, format_code_locations_text,
    format_repositories_json, format_repositories_text, format_snapshot,
};
pub use route::{load_config, logging_config, RunContext};
