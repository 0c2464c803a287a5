//! Aperture: camera capture session core
//!
//! The part of a camera app that sits between the UI and the platform's
//! media framework. It owns the capture session lifecycle (authorization,
//! configuration, start/stop, interruption recovery) and tracks each photo
//! capture from submission until its payload is saved and its companion
//! movie file is cleaned up.
//!
//! Two execution contexts:
//!
//! - **Session context**: a single task ([`runtime`]) that owns the
//!   [`SessionStateMachine`], the [`CaptureRegistry`] and the live-photo
//!   counter. Every mutation happens here, serially.
//! - **UI context**: holds a [`SessionHandle`], receives [`SessionEvent`]s
//!   and keeps its own [`ReadinessTracker`].
//!
//! Platform collaborators (media capture service, permissions, photo
//! library, preferences, location, rotation) are traits in [`platform`];
//! [`simulated`] provides in-process implementations.

pub mod error;
pub mod events;
pub mod feedback;
pub mod library;
pub mod orchestrator;
pub mod platform;
pub mod prefs;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod simulated;

pub use error::{
    CaptureError, ConfigurationFailure, PreferenceError, RegistryError, RejectReason, ServiceError,
};
pub use events::{
    CaptureEvent, EventPublisher, NoOpPublisher, ResourceType, SessionAlert, SessionEvent,
};
pub use feedback::{CaptureReadiness, ReadinessTracker, RotationTracker, ShutterState, TrackingToken};
pub use orchestrator::{CaptureOrchestrator, Finalization, FinalizationOutcome, LivePhotoCounter};
pub use platform::{
    CameraPreference, CaptureCallbacks, LibraryAuthorization, LocationSource, MediaCaptureService,
    PermissionProvider, PhotoLibrary, PreferenceStore, RotationSource, SaveRequest,
};
pub use prefs::{FilePreferenceStore, MemoryPreferenceStore};
pub use registry::{CaptureRegistry, FinalizedCapture, InFlightCapture};
pub use runtime::{SessionHandle, SessionOptions, SessionParts};
pub use session::{
    AuthorizationStatus, CaptureDevice, DevicePosition, DeviceType, InterruptionReason,
    PlatformSignal, RuntimeErrorKind, SessionSnapshot, SessionState, SessionStateMachine,
    SetupResult,
};
pub use settings::{
    CaptureRequest, Dimensions, FlashMode, GeoLocation, PhotoCodec, PhotoOutputCapabilities,
    PhotoSettings, QualityPrioritization, RequestId, ResolvedSettings,
};
