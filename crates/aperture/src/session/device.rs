//! Camera discovery and the persisted default camera.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::platform::{CameraPreference, MediaCaptureService, PreferenceStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    BuiltInDualCamera,
    BuiltInWideAngleCamera,
    BuiltInMicrophone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePosition {
    Back,
    Front,
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureDevice {
    pub id: String,
    pub name: String,
    pub device_type: DeviceType,
    pub position: DevicePosition,
}

/// Back cameras to try, best first.
pub const CAMERA_PRIORITY: [DeviceType; 2] =
    [DeviceType::BuiltInDualCamera, DeviceType::BuiltInWideAngleCamera];

/// Pick the video device for a new session.
///
/// A previously persisted camera wins if the platform still knows it.
/// Otherwise the back cameras are queried in [`CAMERA_PRIORITY`] order and
/// the first hit is persisted for future launches.
pub fn select_video_device(
    service: &dyn MediaCaptureService,
    prefs: &dyn PreferenceStore,
) -> Option<CaptureDevice> {
    if let Some(pref) = prefs.camera_preference().filter(|p| p.initialized) {
        match service.device_with_id(&pref.device_id) {
            Some(device) => {
                debug!("Using persisted camera {}", device.id);
                return Some(device);
            }
            None => warn!("Persisted camera {} no longer available", pref.device_id),
        }
    }

    let discovered = service.discover_devices(&CAMERA_PRIORITY, DevicePosition::Back);
    let device = CAMERA_PRIORITY.iter().find_map(|wanted| {
        discovered
            .iter()
            .find(|d| d.device_type == *wanted && d.position == DevicePosition::Back)
            .cloned()
    })?;

    info!("Discovered default camera {} ({:?})", device.id, device.device_type);
    let preference = CameraPreference {
        initialized: true,
        device_id: device.id.clone(),
    };
    if let Err(e) = prefs.set_camera_preference(preference) {
        warn!("Failed to persist default camera: {}", e);
    }

    Some(device)
}
