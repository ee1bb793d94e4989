//! Configuration file support for complaintdesk
//!
//! Reads from .complaintdesk/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory that marks a complaintdesk workspace (like `.git`)
pub const WORKSPACE_DIR: &str = ".complaintdesk";

/// Default SLA window, in hours, applied when a complaint is created
pub const DEFAULT_RESOLUTION_HOURS: u32 = 72;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// SLA settings applied at complaint creation
    #[serde(default)]
    pub sla: SlaSettings,

    /// Database location override
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// SLA window applied to new complaints.
///
/// Passed explicitly to [`crate::Database::create_complaint`]; nothing reads
/// it from ambient state.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct SlaSettings {
    /// Hours from creation until a complaint breaches its SLA
    /// Default: 72
    #[serde(default = "default_resolution_hours")]
    pub resolution_time_hours: u32,
}

fn default_resolution_hours() -> u32 {
    DEFAULT_RESOLUTION_HOURS
}

impl Default for SlaSettings {
    fn default() -> Self {
        Self {
            resolution_time_hours: DEFAULT_RESOLUTION_HOURS,
        }
    }
}

impl SlaSettings {
    pub fn with_resolution_hours(hours: u32) -> Self {
        Self {
            resolution_time_hours: hours,
        }
    }

    /// The resolution window as a duration
    pub fn resolution_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.resolution_time_hours))
    }
}

/// Database-related configuration
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Path to the SQLite file, relative to the working directory unless
    /// absolute. `COMPLAINTDESK_DB_PATH` still takes priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load config from .complaintdesk/config.toml
    /// Returns default config if the file doesn't exist or can't be read
    pub fn load() -> Self {
        let Some(path) = Self::find_config_path() else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable config, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write this config to `<dir>/config.toml`, creating `dir` if needed
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, ConfigError> {
        let path = dir.join("config.toml");
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(WORKSPACE_DIR).join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }
}
