//! Photo settings, capture requests and the small value types they carry.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use apertureconf::CaptureConfig;

/// Identifier for one capture request, unique within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoCodec {
    #[default]
    Hevc,
    Jpeg,
}

impl PhotoCodec {
    /// File extension used when the photo lands on disk.
    pub fn extension(&self) -> &'static str {
        match self {
            PhotoCodec::Hevc => "heic",
            PhotoCodec::Jpeg => "jpg",
        }
    }
}

impl FromStr for PhotoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hevc" | "heic" => Ok(PhotoCodec::Hevc),
            "jpeg" | "jpg" => Ok(PhotoCodec::Jpeg),
            other => Err(format!("unknown photo codec: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashMode {
    Off,
    On,
    #[default]
    Auto,
}

impl FromStr for FlashMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(FlashMode::Off),
            "on" => Ok(FlashMode::On),
            "auto" => Ok(FlashMode::Auto),
            other => Err(format!("unknown flash mode: {}", other)),
        }
    }
}

/// Trade-off between shot-to-shot speed and image processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPrioritization {
    Speed,
    #[default]
    Balanced,
    Quality,
}

impl FromStr for QualityPrioritization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "speed" => Ok(QualityPrioritization::Speed),
            "balanced" => Ok(QualityPrioritization::Balanced),
            "quality" => Ok(QualityPrioritization::Quality),
            other => Err(format!("unknown quality prioritization: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

/// Requested configuration for a photo capture.
///
/// The session keeps one mutable copy as its base settings; every capture
/// works from its own snapshot of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoSettings {
    pub codec: PhotoCodec,
    pub flash: FlashMode,
    pub max_dimensions: Option<Dimensions>,
    pub quality: QualityPrioritization,
    pub live_photo: bool,
    pub deferred_delivery: bool,
}

impl Default for PhotoSettings {
    fn default() -> Self {
        Self {
            codec: PhotoCodec::default(),
            flash: FlashMode::default(),
            max_dimensions: None,
            quality: QualityPrioritization::default(),
            live_photo: true,
            deferred_delivery: false,
        }
    }
}

impl PhotoSettings {
    /// Build base settings from the capture section of the config.
    ///
    /// Unrecognized strings fall back to the defaults with a warning.
    pub fn from_config(config: &CaptureConfig) -> Self {
        let defaults = Self::default();
        let codec = config.codec.parse().unwrap_or_else(|e: String| {
            tracing::warn!("{}, using {:?}", e, defaults.codec);
            defaults.codec
        });
        let flash = config.flash.parse().unwrap_or_else(|e: String| {
            tracing::warn!("{}, using {:?}", e, defaults.flash);
            defaults.flash
        });
        let quality = config.quality.parse().unwrap_or_else(|e: String| {
            tracing::warn!("{}, using {:?}", e, defaults.quality);
            defaults.quality
        });

        Self {
            codec,
            flash,
            max_dimensions: None,
            quality,
            live_photo: config.live_photo,
            deferred_delivery: config.deferred_delivery,
        }
    }
}

/// What the photo output actually supports once it is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoOutputCapabilities {
    pub live_photo_supported: bool,
    pub deferred_delivery_supported: bool,
    pub max_dimensions: Dimensions,
    pub max_quality: QualityPrioritization,
}

impl Default for PhotoOutputCapabilities {
    fn default() -> Self {
        Self {
            live_photo_supported: false,
            deferred_delivery_supported: false,
            max_dimensions: Dimensions::new(4032, 3024),
            max_quality: QualityPrioritization::Quality,
        }
    }
}

/// Settings the platform resolved for a capture, reported when it begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSettings {
    pub photo_dimensions: Option<Dimensions>,
    /// Present when the capture records a companion movie.
    pub live_photo_movie_dimensions: Option<Dimensions>,
    /// Present when the platform delivers a deferred photo proxy.
    pub deferred_proxy_dimensions: Option<Dimensions>,
}

impl ResolvedSettings {
    pub fn is_live(&self) -> bool {
        self.live_photo_movie_dimensions
            .is_some_and(|d| !d.is_empty())
    }

    pub fn is_deferred_proxy(&self) -> bool {
        self.deferred_proxy_dimensions
            .is_some_and(|d| !d.is_empty())
    }
}

/// One photo capture, from submission to completion.
///
/// Immutable once created: later changes to the base settings never reach a
/// request that is already in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub id: RequestId,
    pub settings: PhotoSettings,
    pub location: Option<GeoLocation>,
    /// Rotation angle in degrees applied to the captured image.
    pub rotation_angle: f64,
    /// Temporary file the companion movie is written to, for live captures.
    pub companion_movie_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl CaptureRequest {
    pub fn is_live(&self) -> bool {
        self.companion_movie_path.is_some()
    }
}
