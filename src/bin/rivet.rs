//! Rivet CLI Binary
//!
//! Command-line interface for interactive Rhai scripting sessions.

use clap::Parser;
use rivet::cli::{load_config, logging_config, map_error, Cli, RunContext};
use rivet::error::SessionError;
use rivet::logging::init_logging;
use rivet::resolver::cache::run_deferred_deletions;
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    // One load serves logging and the run context; a broken config still gets default logging.
    let loaded = load_config(&cli.workspace, cli.config.as_deref());
    let logging = logging_config(&cli, loaded.as_ref().ok());

    if let Err(e) = init_logging(Some(&logging)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        workspace = %cli.workspace.display(),
        "Rivet CLI starting"
    );

    let context = match loaded
        .and_then(|config| RunContext::from_config(config, cli.workspace.clone(), cli.config.clone()))
    {
        Ok(ctx) => ctx,
        Err(e) => exit_with(&e, "Error loading configuration"),
    };

    let result = context.execute(&cli.command);
    // process::exit skips destructors, so pending cache deletions run here.
    let removed = run_deferred_deletions();
    if removed > 0 {
        info!(removed, "Ran deferred cache deletions");
    }

    match result {
        Ok(output) => {
            info!("Command completed successfully");
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => exit_with(&e, "Command failed"),
    }
}

fn exit_with(e: &SessionError, what: &str) -> ! {
    error!(error = %e, "{}", what);
    eprintln!("{}", map_error(e));
    process::exit(1);
}
