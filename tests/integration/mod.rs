//! Integration tests for the Rivet scripting session runtime

mod artifact_cache;
mod cli_route;
mod config_integration;
mod context_generations;
mod manifest_watch;
mod session_evaluation;
mod test_runner;
pub mod test_utils;
