//! Configuration module
//!
//! Persisted defaults for the serial link, outbound frame shape and display

mod settings;

pub use settings::{AppConfig, ConfigError, DisplayConfig, FrameConfig};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "uartlink", "UartLink").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default location of the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
