//! Config loading facade: layered sources into a [`RivetConfig`].

use crate::config::merge::merge_policy::builder_with_defaults;
use crate::config::sources::{global_file, workspace_file};
use crate::config::RivetConfig;
use config::{ConfigError, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads configuration in precedence order (lowest first): built-in defaults, global file,
/// workspace `config/config.toml`, workspace `config/{RIVET_ENV}.toml`, `RIVET_*` variables.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(workspace_root: &Path) -> Result<RivetConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(environment());

        let config: RivetConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load a single file on top of the defaults, ignoring every other source.
    pub fn load_from_file(path: &Path) -> Result<RivetConfig, ConfigError> {
        builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).format(FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        crate::config::paths::global_config_path()
    }
}

/// `RIVET_SESSION__WATCH_MANIFEST=true` style overrides.
fn environment() -> Environment {
    Environment::with_prefix("RIVET")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
