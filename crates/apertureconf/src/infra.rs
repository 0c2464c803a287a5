//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem paths for Aperture state and capture artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for persisted preferences (default camera).
    /// Default: ~/.local/share/aperture
    #[serde(default = "PathsConfig::default_state_dir")]
    pub state_dir: PathBuf,

    /// Scratch directory for live-photo companion movies.
    /// Default: system temp dir + /aperture
    #[serde(default = "PathsConfig::default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Directory the simulated photo library writes into.
    /// Default: ~/Pictures/aperture
    #[serde(default = "PathsConfig::default_library_dir")]
    pub library_dir: PathBuf,
}

impl PathsConfig {
    fn default_state_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/aperture"))
            .unwrap_or_else(|| PathBuf::from(".local/share/aperture"))
    }

    fn default_temp_dir() -> PathBuf {
        std::env::temp_dir().join("aperture")
    }

    fn default_library_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join("Pictures/aperture"))
            .unwrap_or_else(|| PathBuf::from("Pictures/aperture"))
    }

    /// File holding the persisted default-camera preference.
    pub fn preferences_file(&self) -> PathBuf {
        self.state_dir.join("preferences.toml")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: Self::default_state_dir(),
            temp_dir: Self::default_temp_dir(),
            library_dir: Self::default_library_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or EnvFilter directive (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// All infrastructure configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InfraConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
