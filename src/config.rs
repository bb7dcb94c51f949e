//! Daemon endpoint configuration.
//!
//! Front ends persist where their daemon listens; this module loads that
//! TOML file into a [`ClientConfig`] with sensible defaults for every
//! missing field.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default daemon address.
pub const DEFAULT_DAEMON_ADDRESS: &str = "127.0.0.1";

/// Default daemon port.
pub const DEFAULT_DAEMON_PORT: u16 = 29177;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read configuration file: {path}")]
    Read {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("invalid configuration at {path}: {message}")]
    Parse {
        /// Path to the file containing the error.
        path: PathBuf,
        /// Human-readable description of the parse failure.
        message: String,
    },
}

/// Where to find the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Address the daemon listens on.
    pub daemon_address: String,
    /// Port the daemon listens on.
    pub daemon_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            daemon_address: DEFAULT_DAEMON_ADDRESS.to_string(),
            daemon_port: DEFAULT_DAEMON_PORT,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.message().to_string(),
        })
    }

    /// Loads configuration from a TOML file, falling back to defaults when
    /// the file does not exist. Other errors still propagate.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Read { ref source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(Self::default())
            }
            other => other,
        }
    }
}
