//! Config file discovery, loading, and environment variable overlay.

use crate::{ApertureConfig, ConfigError};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/aperture/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("aperture/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("aperture.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and lay its values over `config`.
pub fn load_into(config: &mut ApertureConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Lay the keys present in a TOML document over `config`.
///
/// Keys absent from the document keep whatever value `config` already holds,
/// so files loaded later only override what they mention.
pub fn apply_toml(config: &mut ApertureConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("state_dir").and_then(|v| v.as_str()) {
            config.infra.paths.state_dir = expand_path(v);
        }
        if let Some(v) = paths.get("temp_dir").and_then(|v| v.as_str()) {
            config.infra.paths.temp_dir = expand_path(v);
        }
        if let Some(v) = paths.get("library_dir").and_then(|v| v.as_str()) {
            config.infra.paths.library_dir = expand_path(v);
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.infra.telemetry.log_level = v.to_string();
        }
    }

    if let Some(capture) = table.get("capture").and_then(|v| v.as_table()) {
        if let Some(v) = capture.get("codec").and_then(|v| v.as_str()) {
            config.capture.codec = v.to_string();
        }
        if let Some(v) = capture.get("flash").and_then(|v| v.as_str()) {
            config.capture.flash = v.to_string();
        }
        if let Some(v) = capture.get("quality").and_then(|v| v.as_str()) {
            config.capture.quality = v.to_string();
        }
        if let Some(v) = capture.get("live_photo").and_then(|v| v.as_bool()) {
            config.capture.live_photo = v;
        }
        if let Some(v) = capture.get("deferred_delivery").and_then(|v| v.as_bool()) {
            config.capture.deferred_delivery = v;
        }
        if let Some(v) = capture.get("max_in_flight").and_then(|v| v.as_integer()) {
            if v < 1 {
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    message: format!("capture.max_in_flight must be at least 1, got {}", v),
                });
            }
            config.capture.max_in_flight = u32::try_from(v).map_err(|_| ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("capture.max_in_flight is out of range, got {}", v),
            })?;
        }
    }

    Ok(())
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut ApertureConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("APERTURE_STATE_DIR") {
        config.infra.paths.state_dir = expand_path(&v);
        sources.env_overrides.push("APERTURE_STATE_DIR".to_string());
    }
    if let Ok(v) = env::var("APERTURE_TEMP_DIR") {
        config.infra.paths.temp_dir = expand_path(&v);
        sources.env_overrides.push("APERTURE_TEMP_DIR".to_string());
    }
    if let Ok(v) = env::var("APERTURE_LIBRARY_DIR") {
        config.infra.paths.library_dir = expand_path(&v);
        sources.env_overrides.push("APERTURE_LIBRARY_DIR".to_string());
    }

    if let Ok(v) = env::var("APERTURE_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("APERTURE_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Ok(v) = env::var("APERTURE_LIVE_PHOTO") {
        if let Some(flag) = parse_bool(&v) {
            config.capture.live_photo = flag;
            sources.env_overrides.push("APERTURE_LIVE_PHOTO".to_string());
        }
    }
    if let Ok(v) = env::var("APERTURE_FLASH") {
        config.capture.flash = v;
        sources.env_overrides.push("APERTURE_FLASH".to_string());
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
