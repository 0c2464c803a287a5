//! Collaborators the capture core drives but does not implement.
//!
//! Real hosts bind these to the platform camera stack; [`crate::simulated`]
//! provides in-process stand-ins.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{PreferenceError, ServiceError};
use crate::events::{CaptureEvent, ResourceType};
use crate::session::{AuthorizationStatus, CaptureDevice, DevicePosition, DeviceType};
use crate::settings::{CaptureRequest, GeoLocation, PhotoOutputCapabilities, RequestId};

/// Camera permission prompt.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    fn video_authorization_status(&self) -> AuthorizationStatus;

    /// Ask the user for camera access. Resolves once, when they answer.
    async fn request_video_access(&self) -> bool;
}

/// The platform capture session: devices, inputs, the photo output, and
/// capture submission.
///
/// Called only from the session execution context.
pub trait MediaCaptureService: Send {
    fn discover_devices(&self, types: &[DeviceType], position: DevicePosition) -> Vec<CaptureDevice>;

    fn device_with_id(&self, id: &str) -> Option<CaptureDevice>;

    fn default_audio_device(&self) -> Option<CaptureDevice>;

    fn begin_configuration(&mut self);

    fn commit_configuration(&mut self);

    fn add_input(&mut self, device: &CaptureDevice) -> Result<(), ServiceError>;

    fn add_photo_output(&mut self) -> Result<PhotoOutputCapabilities, ServiceError>;

    fn start_running(&mut self);

    fn stop_running(&mut self);

    fn is_running(&self) -> bool;

    /// Hand a capture to the platform. Every event for it must arrive through
    /// `callbacks`, ending with exactly one [`CaptureEvent::DidFinish`].
    fn submit_capture(
        &mut self,
        request: &CaptureRequest,
        callbacks: CaptureCallbacks,
    ) -> Result<(), ServiceError>;
}

/// Per-request event sender handed to the platform with each capture.
///
/// Events are routed back onto the session execution context.
#[derive(Debug, Clone)]
pub struct CaptureCallbacks {
    id: RequestId,
    tx: mpsc::UnboundedSender<(RequestId, CaptureEvent)>,
}

impl CaptureCallbacks {
    pub fn new(id: RequestId, tx: mpsc::UnboundedSender<(RequestId, CaptureEvent)>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// True once the session has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Deliver an event. Returns false if the session is gone.
    pub fn emit(&self, event: CaptureEvent) -> bool {
        let kind = event.kind();
        match self.tx.send((self.id, event)) {
            Ok(()) => true,
            Err(_) => {
                debug!("{}: dropping {} event, session closed", self.id, kind);
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryAuthorization {
    Authorized,
    Limited,
    Denied,
    Restricted,
    NotDetermined,
}

/// Everything the photo library needs to store one capture.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub id: RequestId,
    pub data: Bytes,
    pub resource_type: ResourceType,
    pub companion_movie: Option<PathBuf>,
    pub location: Option<GeoLocation>,
    pub file_extension: &'static str,
    pub created_at: DateTime<Utc>,
}

/// Photo library writer.
#[async_trait]
pub trait PhotoLibrary: Send + Sync {
    async fn authorization_status(&self) -> LibraryAuthorization;

    async fn write(&self, request: &SaveRequest) -> Result<(), String>;
}

/// The persisted default camera: whether it was ever chosen, and which one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraPreference {
    pub initialized: bool,
    pub device_id: String,
}

/// Process-wide settings storage.
pub trait PreferenceStore: Send + Sync {
    fn camera_preference(&self) -> Option<CameraPreference>;

    fn set_camera_preference(&self, preference: CameraPreference) -> Result<(), PreferenceError>;
}

/// Current device location, if known.
pub trait LocationSource: Send + Sync {
    fn current_location(&self) -> Option<GeoLocation>;
}

/// Rotation to apply to captures and the preview, in degrees.
pub trait RotationSource: Send + Sync {
    fn capture_rotation_angle(&self) -> f64;

    fn preview_rotation_angle(&self) -> f64;
}
