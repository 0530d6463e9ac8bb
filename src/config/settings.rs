//! Application settings

use crate::core::codec::{parse_hex, CodecError, CodecType};
use crate::core::protocol::{FrameShape, MCU_HEADER};
use crate::core::transport::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No usable configuration directory on this platform
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Read or write failure
    #[error("Config file {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Malformed TOML
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialization failure
    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Bad hex in the frame section
    #[error("Invalid frame setting: {0}")]
    Frame(#[from] CodecError),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial link settings
    pub serial: SerialConfig,
    /// Outbound frame shape
    pub frame: FrameConfig,
    /// Display options
    pub display: DisplayConfig,
}

impl AppConfig {
    /// Load from the default location, falling back to defaults if the file is absent
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&path)
    }

    /// Load from `path`, falling back to defaults if the file is absent
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(io_err)
    }
}

/// Outbound frame settings, stored as operator hex
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Header bytes, e.g. `"EF 01"`
    pub header: String,
    /// Trailer bytes; empty for none
    pub tail: String,
    /// Append CRC-16
    pub crc: bool,
    /// Emit the length field
    pub length: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            header: crate::core::codec::format_hex(&MCU_HEADER),
            tail: String::new(),
            crc: true,
            length: true,
        }
    }
}

impl FrameConfig {
    /// Build the frame shape these settings describe
    pub fn shape(&self) -> Result<FrameShape, ConfigError> {
        Ok(FrameShape::new(parse_hex(&self.header)?)
            .with_trailer(parse_hex(&self.tail)?)
            .with_checksum(self.crc)
            .with_length(self.length))
    }
}

/// Display settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// How operator input and received data are rendered
    pub mode: CodecType,
    /// Prefix output lines with a timestamp
    pub timestamps: bool,
    /// Append CR LF to text sends
    pub append_newline: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: CodecType::Text,
            timestamps: true,
            append_newline: false,
        }
    }
}
