//! Subcommand implementations.

pub mod config;
pub mod models;
pub mod run;

use std::path::{Path, PathBuf};

use pairsift_core::Config;

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

/// Load the explicit config file if given, else the default location.
pub fn load_config(path: Option<&Path>) -> Result<Config, pairsift_core::ConfigError> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}
