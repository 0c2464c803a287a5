//! In-process stand-ins for the platform collaborators.
//!
//! Used by the `aperture` binary and the integration tests. The capture
//! service plays back a plausible callback sequence on a spawned task; the
//! library writes into a plain directory.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::events::{CaptureEvent, ResourceType};
use crate::platform::{
    CaptureCallbacks, LibraryAuthorization, LocationSource, MediaCaptureService,
    PermissionProvider, PhotoLibrary, SaveRequest,
};
use crate::session::{
    AuthorizationStatus, CaptureDevice, DevicePosition, DeviceType, PlatformSignal,
    RuntimeErrorKind,
};
use crate::settings::{
    CaptureRequest, Dimensions, GeoLocation, PhotoOutputCapabilities, QualityPrioritization,
    RequestId, ResolvedSettings,
};

const LIVE_MOVIE_DIMENSIONS: Dimensions = Dimensions {
    width: 1920,
    height: 1440,
};
const PROXY_DIMENSIONS: Dimensions = Dimensions {
    width: 1024,
    height: 768,
};

#[derive(Debug)]
struct SimState {
    devices: Vec<CaptureDevice>,
    capabilities: PhotoOutputCapabilities,
    reject_output: bool,
    refuse_start: bool,
    running: bool,
    fail_captures: Option<String>,
    fail_companion_movies: bool,
    latency: Duration,
    submitted: Vec<RequestId>,
}

/// Shared knobs for a [`SimulatedCaptureService`], usable after the
/// service has been handed to the session.
#[derive(Debug, Clone)]
pub struct SimulatorControl {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatorControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorControl {
    pub fn new() -> Self {
        let devices = vec![
            CaptureDevice {
                id: "sim-dual-back".to_string(),
                name: "Simulated Back Dual Camera".to_string(),
                device_type: DeviceType::BuiltInDualCamera,
                position: DevicePosition::Back,
            },
            CaptureDevice {
                id: "sim-wide-back".to_string(),
                name: "Simulated Back Camera".to_string(),
                device_type: DeviceType::BuiltInWideAngleCamera,
                position: DevicePosition::Back,
            },
            CaptureDevice {
                id: "sim-wide-front".to_string(),
                name: "Simulated Front Camera".to_string(),
                device_type: DeviceType::BuiltInWideAngleCamera,
                position: DevicePosition::Front,
            },
            CaptureDevice {
                id: "sim-mic".to_string(),
                name: "Simulated Microphone".to_string(),
                device_type: DeviceType::BuiltInMicrophone,
                position: DevicePosition::Unspecified,
            },
        ];
        Self {
            state: Arc::new(Mutex::new(SimState {
                devices,
                capabilities: PhotoOutputCapabilities {
                    live_photo_supported: true,
                    deferred_delivery_supported: true,
                    max_dimensions: Dimensions::new(4032, 3024),
                    max_quality: QualityPrioritization::Quality,
                },
                reject_output: false,
                refuse_start: false,
                running: false,
                fail_captures: None,
                fail_companion_movies: false,
                latency: Duration::from_millis(5),
                submitted: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove every camera, leaving only the microphone.
    pub fn remove_cameras(&self) {
        self.lock()
            .devices
            .retain(|d| d.device_type == DeviceType::BuiltInMicrophone);
    }

    pub fn set_reject_output(&self, reject: bool) {
        self.lock().reject_output = reject;
    }

    pub fn set_refuse_start(&self, refuse: bool) {
        self.lock().refuse_start = refuse;
    }

    /// Fail every subsequent capture with `reason`, or stop failing.
    pub fn set_fail_captures(&self, reason: Option<String>) {
        self.lock().fail_captures = reason;
    }

    pub fn set_fail_companion_movies(&self, fail: bool) {
        self.lock().fail_companion_movies = fail;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn set_capabilities(&self, capabilities: PhotoOutputCapabilities) {
        self.lock().capabilities = capabilities;
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn submitted(&self) -> Vec<RequestId> {
        self.lock().submitted.clone()
    }

    /// Knock the session over the way a media services reset does. Returns
    /// the signal to deliver to the session.
    pub fn media_services_reset(&self) -> PlatformSignal {
        self.lock().running = false;
        PlatformSignal::RuntimeError(RuntimeErrorKind::MediaServicesReset)
    }
}

pub struct SimulatedCaptureService {
    control: SimulatorControl,
}

impl SimulatedCaptureService {
    pub fn new(control: SimulatorControl) -> Self {
        Self { control }
    }
}

impl MediaCaptureService for SimulatedCaptureService {
    fn discover_devices(&self, types: &[DeviceType], position: DevicePosition) -> Vec<CaptureDevice> {
        let state = self.control.lock();
        // Discovery order follows the requested type order
        types
            .iter()
            .flat_map(|t| {
                state
                    .devices
                    .iter()
                    .filter(move |d| d.device_type == *t && d.position == position)
            })
            .cloned()
            .collect()
    }

    fn device_with_id(&self, id: &str) -> Option<CaptureDevice> {
        self.control.lock().devices.iter().find(|d| d.id == id).cloned()
    }

    fn default_audio_device(&self) -> Option<CaptureDevice> {
        self.control
            .lock()
            .devices
            .iter()
            .find(|d| d.device_type == DeviceType::BuiltInMicrophone)
            .cloned()
    }

    fn begin_configuration(&mut self) {
        debug!("sim: begin configuration");
    }

    fn commit_configuration(&mut self) {
        debug!("sim: commit configuration");
    }

    fn add_input(&mut self, device: &CaptureDevice) -> Result<(), ServiceError> {
        let state = self.control.lock();
        if state.devices.iter().any(|d| d.id == device.id) {
            Ok(())
        } else {
            Err(ServiceError::InputRejected(format!("unknown device {}", device.id)))
        }
    }

    fn add_photo_output(&mut self) -> Result<PhotoOutputCapabilities, ServiceError> {
        let state = self.control.lock();
        if state.reject_output {
            return Err(ServiceError::OutputRejected("photo output unavailable".to_string()));
        }
        Ok(state.capabilities)
    }

    fn start_running(&mut self) {
        let mut state = self.control.lock();
        if state.refuse_start {
            debug!("sim: refusing to start");
            return;
        }
        state.running = true;
    }

    fn stop_running(&mut self) {
        self.control.lock().running = false;
    }

    fn is_running(&self) -> bool {
        self.control.lock().running
    }

    fn submit_capture(
        &mut self,
        request: &CaptureRequest,
        callbacks: CaptureCallbacks,
    ) -> Result<(), ServiceError> {
        let (latency, fail, fail_movie) = {
            let mut state = self.control.lock();
            if !state.running {
                return Err(ServiceError::CaptureRejected("session not running".to_string()));
            }
            state.submitted.push(request.id);
            (
                state.latency,
                state.fail_captures.clone(),
                state.fail_companion_movies,
            )
        };

        let request = request.clone();
        tokio::spawn(async move {
            play_capture(request, callbacks, latency, fail, fail_movie).await;
        });
        Ok(())
    }
}

/// The callback sequence for one capture.
async fn play_capture(
    request: CaptureRequest,
    callbacks: CaptureCallbacks,
    latency: Duration,
    fail: Option<String>,
    fail_movie: bool,
) {
    let settings = &request.settings;
    let photo_dimensions = settings.max_dimensions.unwrap_or(Dimensions::new(4032, 3024));
    let resolved = ResolvedSettings {
        photo_dimensions: Some(photo_dimensions),
        live_photo_movie_dimensions: request.is_live().then_some(LIVE_MOVIE_DIMENSIONS),
        deferred_proxy_dimensions: settings.deferred_delivery.then_some(PROXY_DIMENSIONS),
    };

    callbacks.emit(CaptureEvent::WillBegin(resolved));
    callbacks.emit(CaptureEvent::WillCapture);
    tokio::time::sleep(latency).await;

    if let Some(reason) = fail {
        callbacks.emit(CaptureEvent::DidFinish(Some(reason)));
        return;
    }

    let payload = Bytes::from(format!(
        "{} {}x{} rotation={}",
        settings.codec.extension(),
        photo_dimensions.width,
        photo_dimensions.height,
        request.rotation_angle
    ));
    if resolved.is_deferred_proxy() {
        callbacks.emit(CaptureEvent::DidProduceDeferredProxy(Ok(payload)));
    } else {
        callbacks.emit(CaptureEvent::DidProducePhoto(Ok(payload)));
    }

    if let Some(path) = request.companion_movie_path.clone() {
        tokio::time::sleep(latency).await;
        if callbacks.is_closed() {
            debug!("sim: {} abandoned, not recording movie", request.id);
            return;
        }
        let result = if fail_movie {
            Err("companion movie recording failed".to_string())
        } else {
            tokio::fs::write(&path, format!("movie for {}", request.id))
                .await
                .map(|()| path)
                .map_err(|e| e.to_string())
        };
        callbacks.emit(CaptureEvent::DidFinishCompanionMovie(result));
    }

    callbacks.emit(CaptureEvent::DidFinish(None));
}

/// Permission provider with a fixed status. When the status is
/// `NotDetermined` the prompt answers with `answer`, or waits on the gate
/// created by [`StaticPermissions::gated`].
pub struct StaticPermissions {
    status: AuthorizationStatus,
    answer: bool,
    gate: Mutex<Option<oneshot::Receiver<bool>>>,
}

impl StaticPermissions {
    pub fn new(status: AuthorizationStatus, answer: bool) -> Self {
        Self {
            status,
            answer,
            gate: Mutex::new(None),
        }
    }

    pub fn authorized() -> Self {
        Self::new(AuthorizationStatus::Authorized, true)
    }

    /// An undetermined status whose prompt stays open until the returned
    /// sender answers it.
    pub fn gated() -> (Self, oneshot::Sender<bool>) {
        let (tx, rx) = oneshot::channel();
        let permissions = Self {
            status: AuthorizationStatus::NotDetermined,
            answer: false,
            gate: Mutex::new(Some(rx)),
        };
        (permissions, tx)
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissions {
    fn video_authorization_status(&self) -> AuthorizationStatus {
        self.status
    }

    async fn request_video_access(&self) -> bool {
        let gate = self.gate.lock().unwrap_or_else(|e| e.into_inner()).take();
        match gate {
            Some(rx) => {
                info!("sim: waiting for permission prompt");
                rx.await.unwrap_or(false)
            }
            None => self.answer,
        }
    }
}

/// Location source that always reports the same fix.
pub struct FixedLocation(pub Option<GeoLocation>);

impl LocationSource for FixedLocation {
    fn current_location(&self) -> Option<GeoLocation> {
        self.0
    }
}

/// Metadata written next to each saved photo.
#[derive(Debug, Serialize)]
struct Sidecar<'a> {
    id: RequestId,
    resource_type: ResourceType,
    file: &'a str,
    companion_movie: Option<&'a str>,
    location: Option<GeoLocation>,
    created_at: DateTime<Utc>,
}

/// Photo library backed by a directory.
///
/// Each capture becomes `<id>.<ext>`, plus `<id>.mov` for a companion
/// movie and a `<id>.json` metadata sidecar.
pub struct DirectoryLibrary {
    dir: PathBuf,
    status: Mutex<LibraryAuthorization>,
}

impl DirectoryLibrary {
    pub fn new(dir: impl Into<PathBuf>, status: LibraryAuthorization) -> Self {
        Self {
            dir: dir.into(),
            status: Mutex::new(status),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn set_authorization(&self, status: LibraryAuthorization) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }
}

#[async_trait]
impl PhotoLibrary for DirectoryLibrary {
    async fn authorization_status(&self) -> LibraryAuthorization {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn write(&self, request: &SaveRequest) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| format!("create {}: {}", self.dir.display(), e))?;

        let file = format!("{}.{}", request.id, request.file_extension);
        let photo_path = self.dir.join(&file);
        tokio::fs::write(&photo_path, &request.data)
            .await
            .map_err(|e| format!("write {}: {}", photo_path.display(), e))?;

        let movie = match &request.companion_movie {
            Some(src) => {
                let name = format!("{}.mov", request.id);
                let dest = self.dir.join(&name);
                tokio::fs::copy(src, &dest)
                    .await
                    .map_err(|e| format!("copy {}: {}", src.display(), e))?;
                Some(name)
            }
            None => None,
        };

        let sidecar = Sidecar {
            id: request.id,
            resource_type: request.resource_type,
            file: &file,
            companion_movie: movie.as_deref(),
            location: request.location,
            created_at: request.created_at,
        };
        let json = serde_json::to_vec_pretty(&sidecar).map_err(|e| e.to_string())?;
        let sidecar_path = self.dir.join(format!("{}.json", request.id));
        tokio::fs::write(&sidecar_path, json)
            .await
            .map_err(|e| format!("write {}: {}", sidecar_path.display(), e))?;

        info!("Saved {} to {}", request.id, photo_path.display());
        Ok(())
    }
}
