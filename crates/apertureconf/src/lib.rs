//! Minimal configuration loading for Aperture.
//!
//! Imported by the capture core and the `aperture` binary, so it keeps its
//! dependencies small.
//!
//! # Configuration Philosophy
//!
//! - **Infrastructure** (`InfraConfig`): paths and logging that cannot change
//!   once the session is up.
//! - **Capture defaults** (`CaptureConfig`): seed the base photo settings.
//!   After startup the session owns them.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/aperture/config.toml` (system)
//! 2. `~/.config/aperture/config.toml` (user)
//! 3. `./aperture.toml` (local override, replaced by an explicit path)
//! 4. Environment variables (`APERTURE_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! state_dir = "~/.local/share/aperture"
//! temp_dir = "/tmp/aperture"
//! library_dir = "~/Pictures/aperture"
//!
//! [telemetry]
//! log_level = "info"
//!
//! [capture]
//! codec = "hevc"
//! flash = "auto"
//! quality = "balanced"
//! live_photo = true
//! deferred_delivery = false
//! max_in_flight = 4
//! ```

pub mod capture;
pub mod infra;
pub mod loader;

pub use capture::CaptureConfig;
pub use infra::{InfraConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete Aperture configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ApertureConfig {
    /// Infrastructure - cannot change at runtime.
    #[serde(flatten)]
    pub infra: InfraConfig,

    /// Capture defaults - seed the base photo settings.
    #[serde(default)]
    pub capture: CaptureConfig,
}

impl ApertureConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./aperture.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = ApertureConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::load_into(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();

        output.push_str("# Aperture Configuration\n\n");

        output.push_str("[paths]\n");
        let paths = &self.infra.paths;
        output.push_str(&format!("state_dir = {}\n", quoted(&paths.state_dir.to_string_lossy())));
        output.push_str(&format!("temp_dir = {}\n", quoted(&paths.temp_dir.to_string_lossy())));
        output.push_str(&format!(
            "library_dir = {}\n",
            quoted(&paths.library_dir.to_string_lossy())
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = {}\n",
            quoted(&self.infra.telemetry.log_level)
        ));

        output.push_str("\n[capture]\n");
        output.push_str(&format!("codec = {}\n", quoted(&self.capture.codec)));
        output.push_str(&format!("flash = {}\n", quoted(&self.capture.flash)));
        output.push_str(&format!("quality = {}\n", quoted(&self.capture.quality)));
        output.push_str(&format!("live_photo = {}\n", self.capture.live_photo));
        output.push_str(&format!(
            "deferred_delivery = {}\n",
            self.capture.deferred_delivery
        ));
        output.push_str(&format!("max_in_flight = {}\n", self.capture.max_in_flight));

        output
    }
}

/// Render a string as a TOML basic string, escaping as needed.
fn quoted(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
