//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("session.use_manifest_resolution", false)?
        .set_default("session.resolver", "manifest_file")?
        .set_default("session.include_local_build_output", true)?
        .set_default("session.build_output_dirs", vec!["build/main", "build/test"])?
        .set_default("session.autorun_global", true)?
        .set_default("session.autorun_project", true)?
        .set_default("session.watch_manifest", false)
}
