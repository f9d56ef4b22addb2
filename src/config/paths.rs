//! Locations of per-user configuration.

use std::path::PathBuf;

/// Application name used for per-user directories.
pub const APP_NAME: &str = "rivet";

/// `$XDG_CONFIG_HOME/rivet`, falling back to `~/.config/rivet`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(xdg).join(APP_NAME));
    }
    std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| PathBuf::from(home).join(".config").join(APP_NAME))
}

/// Path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
