//! Capture defaults - seed the base photo settings, then the session owns them.
//!
//! Values are kept as plain strings here so this crate stays free of the
//! core's types; the core parses them when building its base settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Preferred codec: "hevc" or "jpeg".
    #[serde(default = "CaptureConfig::default_codec")]
    pub codec: String,

    /// Flash mode: "off", "on" or "auto".
    #[serde(default = "CaptureConfig::default_flash")]
    pub flash: String,

    /// Quality prioritization: "speed", "balanced" or "quality".
    #[serde(default = "CaptureConfig::default_quality")]
    pub quality: String,

    /// Capture Live Photos when the photo output supports them.
    #[serde(default = "CaptureConfig::default_live_photo")]
    pub live_photo: bool,

    /// Ask for a deferred photo proxy when the output supports it.
    #[serde(default)]
    pub deferred_delivery: bool,

    /// How many captures the shutter allows in flight before dimming.
    #[serde(default = "CaptureConfig::default_max_in_flight")]
    pub max_in_flight: u32,
}

impl CaptureConfig {
    fn default_codec() -> String {
        "hevc".to_string()
    }

    fn default_flash() -> String {
        "auto".to_string()
    }

    fn default_quality() -> String {
        "balanced".to_string()
    }

    fn default_live_photo() -> bool {
        true
    }

    fn default_max_in_flight() -> u32 {
        4
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            codec: Self::default_codec(),
            flash: Self::default_flash(),
            quality: Self::default_quality(),
            live_photo: Self::default_live_photo(),
            deferred_delivery: false,
            max_in_flight: Self::default_max_in_flight(),
        }
    }
}
