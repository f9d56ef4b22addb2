//! CLI route: single route table and run context. Dispatches to session services and presentation.

use crate::cli::help::REPL_HELP;
use crate::cli::parse::{CacheCommands, Cli, Commands, RepoCommands};
use crate::cli::presentation::{
    format_cache_entries, format_code_locations_json, format_code_locations_text,
    format_repositories_json, format_repositories_text, format_snapshot,
};
use crate::cli::command_name;
use crate::config::{ConfigLoader, RivetConfig};
use crate::error::SessionError;
use crate::logging::LoggingConfig;
use crate::report::{ConsoleTranscript, TestCase};
use crate::resolver::{
    ArtifactCache, Coordinate, PurgeOutcome, RepositoryDescriptor, RepositoryStore,
};
use crate::session::{NoopListener, Session};
use crate::watch::{ManifestWatcher, DEFAULT_DEBOUNCE};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

/// Runtime context for CLI execution: workspace, config path and the loaded configuration.
pub struct RunContext {
    config: RivetConfig,
    workspace_root: PathBuf,
    config_path: Option<PathBuf>,
}

/// Load the explicit config file when given, otherwise the layered workspace configuration.
pub fn load_config(workspace_root: &Path, config_path: Option<&Path>) -> Result<RivetConfig, SessionError> {
    match config_path {
        Some(path) => Ok(ConfigLoader::load_from_file(path)?),
        None => Ok(ConfigLoader::load(workspace_root)?),
    }
}

/// Logging configuration from CLI args over the loaded config file. Logging is off without
/// `--verbose`.
pub fn logging_config(cli: &Cli, config: Option<&RivetConfig>) -> LoggingConfig {
    if !cli.verbose {
        return LoggingConfig {
            level: "off".to_string(),
            ..LoggingConfig::default()
        };
    }

    let mut logging = config.map(|c| c.logging.clone()).unwrap_or_default();
    if let Some(ref level) = cli.log_level {
        logging.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        logging.format = format.clone();
    }
    if let Some(ref file) = cli.log_file {
        logging.file = file.clone();
    }
    match cli.log_output {
        Some(ref output) => logging.output = output.clone(),
        // The REPL shares the terminal with the transcript.
        None if matches!(cli.command, Commands::Repl { .. }) => logging.output = "file".to_string(),
        None => {}
    }
    logging
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, SessionError> {
        let config = load_config(&workspace_root, config_path.as_deref())?;
        Self::from_config(config, workspace_root, config_path)
    }

    /// Create run context from an already loaded configuration. Validates it and defaults the
    /// project directory to the workspace.
    pub fn from_config(
        mut config: RivetConfig,
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
    ) -> Result<Self, SessionError> {
        config.validate().map_err(|errors| {
            SessionError::ConfigError(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;

        if config.session.project_dir.is_none() {
            config.session.project_dir =
                Some(dunce::canonicalize(&workspace_root).unwrap_or_else(|_| workspace_root.clone()));
        }

        Ok(Self {
            config,
            workspace_root,
            config_path,
        })
    }

    pub fn config(&self) -> &RivetConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, SessionError> {
        let name = command_name(command);
        let span = info_span!("command", command = %name);
        let _entered = span.enter();
        let started = Instant::now();
        debug!(
            workspace = %self.workspace_root.display(),
            config = ?self.config_path,
            "Executing command"
        );

        let result = match command {
            Commands::Repl { watch } => self.handle_repl(*watch),
            Commands::Run { file } => self.handle_run(file),
            Commands::Test { files } => self.handle_test(files),
            Commands::Repos { command } => self.handle_repos(command),
            Commands::Cache { command } => self.handle_cache(command),
            Commands::Resolve { format } => self.handle_resolve(format),
        };

        info!(
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn open_session(&self) -> Result<Session, SessionError> {
        let color = self.config.logging.color;
        Session::new(self.config.session.clone(), Arc::new(ConsoleTranscript::new(color)))
    }

    fn handle_repl(&self, watch: bool) -> Result<String, SessionError> {
        let session = self.open_session()?;
        session.rebuild_context_blocking()?;

        let _watcher = if watch || self.config.session.watch_manifest {
            match ManifestWatcher::start(session.clone(), DEFAULT_DEBOUNCE) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(error = %e, "Manifest watching unavailable");
                    session
                        .transcript()
                        .on_warning(&format!("Not watching the manifest: {}", e));
                    None
                }
            }
        } else {
            None
        };

        session.transcript().prompt();
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = line?;
            let input = line.trim();
            match input {
                "" => session.transcript().prompt(),
                ":quit" | ":q" => break,
                ":help" => {
                    session.transcript().on_output(REPL_HELP);
                    session.transcript().prompt();
                }
                ":vars" => {
                    let text = session
                        .environment_snapshot()
                        .map(|snapshot| format_snapshot(&snapshot))
                        .unwrap_or_else(|| "No session bindings.".to_string());
                    session.transcript().on_output(&text);
                    session.transcript().prompt();
                }
                ":restart" => {
                    session.restart()?.join()?;
                    session.transcript().prompt();
                }
                script => {
                    // Output and faults reach the transcript from the task itself.
                    match session.evaluate_async(script, "repl", Arc::new(NoopListener), Vec::new()) {
                        Ok(handle) => {
                            let _ = handle.join();
                        }
                        Err(e) => {
                            session.transcript().on_warning(&e.to_string());
                            session.transcript().prompt();
                        }
                    }
                }
            }
        }

        session.shutdown();
        Ok(String::new())
    }

    fn handle_run(&self, file: &Path) -> Result<String, SessionError> {
        let script = std::fs::read_to_string(file)?;
        let session = self.open_session()?;
        session.rebuild_context_blocking()?;
        let result = session.evaluate(&script, &[]);
        session.shutdown();

        let value = result?;
        Ok(if value.is_unit() {
            String::new()
        } else {
            value.to_string()
        })
    }

    fn handle_test(&self, files: &[PathBuf]) -> Result<String, SessionError> {
        let mut cases = Vec::with_capacity(files.len());
        for file in files {
            let title = file
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            cases.push(TestCase::new(title, std::fs::read_to_string(file)?));
        }

        let session = self.open_session()?;
        session.rebuild_context_blocking()?;
        let result = session.run_tests(cases);
        session.shutdown();

        let run = result?;
        if run.all_passed() {
            Ok(String::new())
        } else {
            Err(SessionError::TaskFailed(run.summary_line()))
        }
    }

    fn repository_store(&self) -> Result<RepositoryStore, SessionError> {
        RepositoryStore::default_location().ok_or_else(|| {
            SessionError::ConfigError("no configuration directory for the repository list".to_string())
        })
    }

    fn handle_repos(&self, command: &RepoCommands) -> Result<String, SessionError> {
        let store = self.repository_store()?;
        match command {
            RepoCommands::List { format } => {
                let repositories = store.load()?;
                Ok(match format.as_str() {
                    "json" => format_repositories_json(&repositories),
                    _ => format_repositories_text(&repositories),
                })
            }
            RepoCommands::Add { id, address, kind } => {
                let repositories =
                    store.add(RepositoryDescriptor::new(id.clone(), kind.clone(), address.clone()))?;
                Ok(format!(
                    "Added repository '{}' ({} configured)",
                    id,
                    repositories.len()
                ))
            }
            RepoCommands::Remove { id } => {
                if store.remove(id)? {
                    Ok(format!("Removed repository '{}'", id))
                } else {
                    Ok(format!("Repository '{}' not found", id))
                }
            }
            RepoCommands::Reset => {
                let repositories = store.reset()?;
                Ok(format_repositories_text(&repositories))
            }
        }
    }

    fn handle_cache(&self, command: &CacheCommands) -> Result<String, SessionError> {
        let cache = ArtifactCache::new(
            self.config
                .session
                .cache_dir
                .clone()
                .unwrap_or_else(ArtifactCache::default_root),
        );
        match command {
            CacheCommands::List => Ok(format_cache_entries(&cache.entries())),
            CacheCommands::Purge { coordinate } => {
                let coordinate: Coordinate = coordinate.parse()?;
                Ok(match cache.purge(&coordinate) {
                    PurgeOutcome::Removed => format!("Purged {}", coordinate),
                    PurgeOutcome::NotCached => format!("{} is not cached", coordinate),
                    PurgeOutcome::Deferred => {
                        format!("{} is in use; it will be removed when rivet exits", coordinate)
                    }
                })
            }
        }
    }

    fn handle_resolve(&self, format: &str) -> Result<String, SessionError> {
        let session = self.open_session()?;
        let locations = session.resolve_dependencies()?;
        Ok(match format {
            "json" => format_code_locations_json(&locations),
            _ => format_code_locations_text(&locations),
        })
    }
}
