//! Session state machine.
//!
//! ```text
//! Uninitialized ──denied──▶ NotAuthorized
//!       │
//!   configure ──fail──▶ ConfigurationFailed
//!       ▼
//!   Configured ──start──▶ Running ──stop──▶ Stopped ──start──▶ Running
//!                           │  ▲
//!               interrupted │  │ ended / resume / media services reset
//!                           ▼  │
//!                       Interrupted(reason)
//! ```
//!
//! NotAuthorized and ConfigurationFailed are terminal: nothing retries them.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{CaptureError, ConfigurationFailure};
use crate::events::{EventPublisher, SessionAlert, SessionEvent};
use crate::platform::{MediaCaptureService, PermissionProvider, PreferenceStore};
use crate::session::device::{select_video_device, CaptureDevice};
use crate::session::{
    AuthorizationStatus, InterruptionReason, PlatformSignal, RuntimeErrorKind, SessionState,
    SetupResult,
};
use crate::settings::PhotoOutputCapabilities;

pub struct SessionStateMachine {
    state: SessionState,
    setup_result: SetupResult,
    failure: Option<ConfigurationFailure>,
    service: Box<dyn MediaCaptureService>,
    prefs: Arc<dyn PreferenceStore>,
    publisher: Arc<dyn EventPublisher>,
    video_device: Option<CaptureDevice>,
    audio_device: Option<CaptureDevice>,
    capabilities: Option<PhotoOutputCapabilities>,
}

impl SessionStateMachine {
    pub fn new(
        service: Box<dyn MediaCaptureService>,
        prefs: Arc<dyn PreferenceStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            state: SessionState::Uninitialized,
            setup_result: SetupResult::Success,
            failure: None,
            service,
            prefs,
            publisher,
            video_device: None,
            audio_device: None,
            capabilities: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn setup_result(&self) -> SetupResult {
        self.setup_result
    }

    pub fn capabilities(&self) -> Option<PhotoOutputCapabilities> {
        self.capabilities
    }

    pub fn video_device(&self) -> Option<&CaptureDevice> {
        self.video_device.as_ref()
    }

    pub fn audio_device(&self) -> Option<&CaptureDevice> {
        self.audio_device.as_ref()
    }

    pub fn service_mut(&mut self) -> &mut dyn MediaCaptureService {
        self.service.as_mut()
    }

    // === Authorization ===

    /// Check camera authorization, prompting if the user has not decided.
    ///
    /// The caller is the session context; awaiting here holds back every
    /// queued session command until the user answers.
    pub async fn authorize(&mut self, permissions: &dyn PermissionProvider) -> SetupResult {
        if self.state != SessionState::Uninitialized || self.setup_result != SetupResult::Success {
            return self.setup_result;
        }

        let granted = match permissions.video_authorization_status() {
            AuthorizationStatus::Authorized => true,
            AuthorizationStatus::NotDetermined => {
                info!("Camera authorization not determined, prompting");
                permissions.request_video_access().await
            }
            status => {
                debug!("Camera authorization is {:?}", status);
                false
            }
        };

        self.authorization_resolved(granted);
        self.setup_result
    }

    /// Record the answer to the camera permission prompt.
    pub fn authorization_resolved(&mut self, granted: bool) {
        if granted || self.setup_result != SetupResult::Success {
            return;
        }
        warn!("Camera access denied");
        self.setup_result = SetupResult::NotAuthorized;
        self.transition(SessionState::NotAuthorized);
        self.publisher.publish(SessionEvent::Alert {
            alert: SessionAlert::NotAuthorized,
        });
    }

    // === Configuration ===

    /// Attach the video input, a best-effort audio input and the photo output.
    ///
    /// No-op once setup has failed or the session is already configured.
    pub fn configure(&mut self) -> Result<(), CaptureError> {
        if self.setup_result != SetupResult::Success {
            debug!("configure skipped, setup result is {:?}", self.setup_result);
            return Err(self.setup_error());
        }
        if self.state != SessionState::Uninitialized {
            debug!("configure skipped, session is {:?}", self.state);
            return Ok(());
        }

        self.service.begin_configuration();

        let Some(video) = select_video_device(self.service.as_ref(), self.prefs.as_ref()) else {
            return Err(self.fail_configuration(ConfigurationFailure::NoVideoDevice));
        };
        if let Err(e) = self.service.add_input(&video) {
            return Err(self.fail_configuration(ConfigurationFailure::VideoInputRejected(
                e.to_string(),
            )));
        }
        info!("Video input attached: {}", video.name);
        self.video_device = Some(video);

        match self.service.default_audio_device() {
            Some(audio) => match self.service.add_input(&audio) {
                Ok(()) => {
                    info!("Audio input attached: {}", audio.name);
                    self.audio_device = Some(audio);
                }
                Err(e) => warn!("Could not add audio input: {}", e),
            },
            None => warn!("No audio device available"),
        }

        let capabilities = match self.service.add_photo_output() {
            Ok(c) => c,
            Err(e) => {
                return Err(self.fail_configuration(ConfigurationFailure::PhotoOutputRejected(
                    e.to_string(),
                )));
            }
        };
        debug!("Photo output capabilities: {:?}", capabilities);
        self.capabilities = Some(capabilities);

        self.service.commit_configuration();
        self.transition(SessionState::Configured);
        Ok(())
    }

    fn fail_configuration(&mut self, failure: ConfigurationFailure) -> CaptureError {
        warn!("Session configuration failed: {}", failure);
        self.service.commit_configuration();
        self.setup_result = SetupResult::ConfigurationFailed;
        self.failure = Some(failure.clone());
        self.transition(SessionState::ConfigurationFailed);
        self.publisher.publish(SessionEvent::Alert {
            alert: SessionAlert::ConfigurationFailed {
                failure: failure.clone(),
            },
        });
        CaptureError::ConfigurationFailed(failure)
    }

    fn setup_error(&self) -> CaptureError {
        match self.setup_result {
            SetupResult::NotAuthorized => CaptureError::NotAuthorized,
            _ => CaptureError::ConfigurationFailed(
                self.failure
                    .clone()
                    .unwrap_or(ConfigurationFailure::NoVideoDevice),
            ),
        }
    }

    // === Run / stop ===

    pub fn start(&mut self) -> Result<SessionState, CaptureError> {
        if self.setup_result != SetupResult::Success {
            let alert = match self.setup_result {
                SetupResult::NotAuthorized => SessionAlert::NotAuthorized,
                _ => SessionAlert::ConfigurationFailed {
                    failure: self
                        .failure
                        .clone()
                        .unwrap_or(ConfigurationFailure::NoVideoDevice),
                },
            };
            self.publisher.publish(SessionEvent::Alert { alert });
            return Err(self.setup_error());
        }

        match self.state {
            SessionState::Configured | SessionState::Stopped => {
                self.service.start_running();
                if self.service.is_running() {
                    self.transition(SessionState::Running);
                } else {
                    warn!("Session did not start running");
                }
            }
            SessionState::Uninitialized => warn!("start ignored, session not configured"),
            other => debug!("start ignored, session is {:?}", other),
        }
        Ok(self.state)
    }

    pub fn stop(&mut self) -> SessionState {
        match self.state {
            SessionState::Running | SessionState::Interrupted(_) => {
                self.service.stop_running();
                self.transition(SessionState::Stopped);
            }
            other => debug!("stop ignored, session is {:?}", other),
        }
        self.state
    }

    // === Interruptions ===

    pub fn handle_signal(&mut self, signal: PlatformSignal) {
        match signal {
            PlatformSignal::InterruptionBegan(reason) => self.interrupt(reason),
            PlatformSignal::InterruptionEnded => self.interruption_ended(),
            PlatformSignal::RuntimeError(kind) => self.runtime_error(kind),
        }
    }

    fn interrupt(&mut self, reason: InterruptionReason) {
        match self.state {
            SessionState::Running | SessionState::Interrupted(_) => {
                info!("Session interrupted: {:?}", reason);
                self.transition(SessionState::Interrupted(reason));
                self.publisher.publish(SessionEvent::InterruptionBegan {
                    reason,
                    resume_available: reason.resume_available(),
                });
            }
            other => debug!("interruption {:?} ignored, session is {:?}", reason, other),
        }
    }

    fn interruption_ended(&mut self) {
        let SessionState::Interrupted(reason) = self.state else {
            debug!("interruption end ignored, session is {:?}", self.state);
            return;
        };

        if !self.service.is_running() {
            self.service.start_running();
        }
        if self.service.is_running() {
            info!("Interruption ({:?}) ended", reason);
            self.transition(SessionState::Running);
            self.publisher.publish(SessionEvent::InterruptionEnded);
        } else {
            warn!("Interruption ({:?}) ended but session is not running", reason);
            self.publisher.publish(SessionEvent::Alert {
                alert: SessionAlert::ResumeFailed,
            });
        }
    }

    fn runtime_error(&mut self, kind: RuntimeErrorKind) {
        let was_running = matches!(
            self.state,
            SessionState::Running | SessionState::Interrupted(_)
        );
        warn!("Capture session runtime error: {:?}", kind);

        if !was_running {
            debug!("runtime error while {:?}, nothing to recover", self.state);
            return;
        }

        if kind == RuntimeErrorKind::MediaServicesReset {
            self.service.start_running();
            if self.service.is_running() {
                info!("Session restarted after media services reset");
                if self.state != SessionState::Running {
                    self.transition(SessionState::Running);
                    self.publisher.publish(SessionEvent::InterruptionEnded);
                }
                return;
            }
            warn!("Session did not restart after media services reset");
        }

        self.interrupt(InterruptionReason::Unknown);
    }

    /// Try once to restart an interrupted session.
    pub fn resume(&mut self) -> Result<SessionState, CaptureError> {
        if !matches!(self.state, SessionState::Interrupted(_)) {
            debug!("resume ignored, session is {:?}", self.state);
            return Ok(self.state);
        }

        self.service.start_running();
        if self.service.is_running() {
            info!("Session resumed");
            self.transition(SessionState::Running);
            self.publisher.publish(SessionEvent::InterruptionEnded);
            Ok(self.state)
        } else {
            warn!("Unable to resume session");
            self.publisher.publish(SessionEvent::Alert {
                alert: SessionAlert::ResumeFailed,
            });
            Err(CaptureError::ResumeFailed)
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        info!("Session {:?} -> {:?}", from, to);
        self.state = to;
        self.publisher.publish(SessionEvent::StateChanged { from, to });
    }
}
