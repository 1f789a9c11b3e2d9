//! Configuration module
//!
//! Handles coupler descriptions and logging settings

mod settings;

pub use settings::{Config, CouplerConfig, LoggingConfig, TerminalConfig};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "ekbus", "Ekbus").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default configuration file path
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
