//! Capture session lifecycle.
//!
//! [`SessionStateMachine`] owns the session state and every configuration
//! command sent to the media capture service. It runs only on the session
//! execution context (see [`crate::runtime`]).

pub mod device;
pub mod machine;

use serde::Serialize;

pub use device::{select_video_device, CaptureDevice, DevicePosition, DeviceType, CAMERA_PRIORITY};
pub use machine::SessionStateMachine;

/// Why the platform interrupted a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionReason {
    AudioInUse,
    VideoInUse,
    MultiAppUnavailable,
    SystemPressure,
    Unknown,
}

impl InterruptionReason {
    /// Whether the user can try to resume while this interruption lasts.
    ///
    /// Device contention clears on its own if the user retries; multi-app
    /// and pressure interruptions show a "camera unavailable" state instead.
    pub fn resume_available(&self) -> bool {
        matches!(
            self,
            InterruptionReason::AudioInUse
                | InterruptionReason::VideoInUse
                | InterruptionReason::Unknown
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    NotAuthorized,
    ConfigurationFailed,
    Configured,
    Running,
    Interrupted(InterruptionReason),
    Stopped,
}

impl SessionState {
    /// Whether a capture may be submitted in this state.
    pub fn accepts_captures(&self) -> bool {
        matches!(self, SessionState::Configured | SessionState::Running)
    }
}

/// Outcome of authorization and configuration. Anything but `Success` is
/// terminal for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupResult {
    Success,
    NotAuthorized,
    ConfigurationFailed,
}

/// Camera authorization as reported by the permission provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Authorized,
    NotDetermined,
    Denied,
    Restricted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// The platform media daemon restarted underneath the session.
    MediaServicesReset,
    Other(String),
}

/// Lifecycle notification from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformSignal {
    InterruptionBegan(InterruptionReason),
    InterruptionEnded,
    RuntimeError(RuntimeErrorKind),
}

/// Point-in-time view of the session for the UI context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub setup_result: SetupResult,
    pub in_flight_requests: usize,
    pub live_photos_in_progress: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_captures() {
        assert!(SessionState::Running.accepts_captures());
        assert!(SessionState::Configured.accepts_captures());
        assert!(!SessionState::NotAuthorized.accepts_captures());
        assert!(!SessionState::Interrupted(InterruptionReason::VideoInUse).accepts_captures());
        assert!(!SessionState::Stopped.accepts_captures());
    }

    #[test]
    fn test_resume_affordance() {
        assert!(InterruptionReason::AudioInUse.resume_available());
        assert!(!InterruptionReason::MultiAppUnavailable.resume_available());
        assert!(!InterruptionReason::SystemPressure.resume_available());
    }
}
