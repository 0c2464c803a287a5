//! UI-facing feedback: rotation angles and shutter readiness.
//!
//! Both are passive observers. The rotation tracker is written by whatever
//! watches device orientation and read by the orchestrator when it tags a
//! request. The readiness tracker lives on the UI context and is fed from
//! [`SessionEvent`]s.

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use portable_atomic::AtomicF64;
use serde::Serialize;
use tracing::debug;

use crate::events::SessionEvent;
use crate::platform::RotationSource;
use crate::session::SessionState;
use crate::settings::RequestId;

/// Preview and capture rotation angles in degrees.
///
/// Shared between the orientation observer and the session context, so
/// values are plain relaxed atomics.
#[derive(Debug)]
pub struct RotationTracker {
    preview: AtomicF64,
    capture: AtomicF64,
}

impl Default for RotationTracker {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl RotationTracker {
    pub fn new(angle: f64) -> Self {
        Self {
            preview: AtomicF64::new(angle),
            capture: AtomicF64::new(angle),
        }
    }

    pub fn set_preview_angle(&self, degrees: f64) {
        self.preview.store(normalize(degrees), Ordering::Relaxed);
    }

    pub fn set_capture_angle(&self, degrees: f64) {
        self.capture.store(normalize(degrees), Ordering::Relaxed);
    }
}

/// Wrap into [0, 360).
fn normalize(degrees: f64) -> f64 {
    degrees.rem_euclid(360.0)
}

impl RotationSource for RotationTracker {
    fn capture_rotation_angle(&self) -> f64 {
        self.capture.load(Ordering::Relaxed)
    }

    fn preview_rotation_angle(&self) -> f64 {
        self.preview.load(Ordering::Relaxed)
    }
}

/// Whether the pipeline can take another capture right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureReadiness {
    SessionNotRunning,
    Ready,
    /// A shutter press is being dispatched to the session.
    NotReadyMomentarily,
    /// The platform has not fired the shutter yet.
    NotReadyWaitingForCapture,
    /// Too many captures are still processing.
    NotReadyWaitingForProcessing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutterState {
    pub enabled: bool,
    /// Show the busy indicator.
    pub busy: bool,
}

impl From<CaptureReadiness> for ShutterState {
    fn from(readiness: CaptureReadiness) -> Self {
        match readiness {
            CaptureReadiness::Ready => ShutterState {
                enabled: true,
                busy: false,
            },
            CaptureReadiness::SessionNotRunning | CaptureReadiness::NotReadyMomentarily => {
                ShutterState {
                    enabled: false,
                    busy: false,
                }
            }
            CaptureReadiness::NotReadyWaitingForCapture
            | CaptureReadiness::NotReadyWaitingForProcessing => ShutterState {
                enabled: false,
                busy: true,
            },
        }
    }
}

/// Handle for a shutter press that has not been submitted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackingToken(u64);

/// Readiness bookkeeping for the UI context.
///
/// A press is tracked from [`start_tracking`](Self::start_tracking) until
/// it is either withdrawn with [`stop_tracking`](Self::stop_tracking) or
/// bound to a request id with [`submitted`](Self::submitted). Bound
/// requests wait for the shutter, then count toward the processing limit
/// until the capture finishes.
#[derive(Debug)]
pub struct ReadinessTracker {
    running: bool,
    max_in_flight: usize,
    next_token: u64,
    pending: HashSet<TrackingToken>,
    awaiting_shutter: HashSet<RequestId>,
    processing: HashSet<RequestId>,
}

impl ReadinessTracker {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            running: false,
            max_in_flight: max_in_flight.max(1),
            next_token: 0,
            pending: HashSet::new(),
            awaiting_shutter: HashSet::new(),
            processing: HashSet::new(),
        }
    }

    pub fn start_tracking(&mut self) -> TrackingToken {
        self.next_token += 1;
        let token = TrackingToken(self.next_token);
        self.pending.insert(token);
        token
    }

    /// Withdraw a press before it reaches the session. Returns false if the
    /// token was already bound or withdrawn.
    pub fn stop_tracking(&mut self, token: TrackingToken) -> bool {
        self.pending.remove(&token)
    }

    /// The session accepted the press as `id`.
    pub fn submitted(&mut self, token: TrackingToken, id: RequestId) {
        if self.pending.remove(&token) {
            self.awaiting_shutter.insert(id);
        } else {
            debug!("{}: submitted with stale tracking token", id);
        }
    }

    pub fn observe(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::StateChanged { to, .. } => {
                self.running = *to == SessionState::Running;
            }
            SessionEvent::ShutterAnimation { id } | SessionEvent::PhotoProduced { id } => {
                if self.awaiting_shutter.remove(id) {
                    self.processing.insert(*id);
                }
            }
            SessionEvent::CaptureFinished { id } => {
                self.awaiting_shutter.remove(id);
                self.processing.remove(id);
            }
            _ => {}
        }
    }

    pub fn readiness(&self) -> CaptureReadiness {
        if !self.running {
            CaptureReadiness::SessionNotRunning
        } else if !self.pending.is_empty() {
            CaptureReadiness::NotReadyMomentarily
        } else if !self.awaiting_shutter.is_empty() {
            CaptureReadiness::NotReadyWaitingForCapture
        } else if self.processing.len() >= self.max_in_flight {
            CaptureReadiness::NotReadyWaitingForProcessing
        } else {
            CaptureReadiness::Ready
        }
    }

    pub fn shutter_state(&self) -> ShutterState {
        self.readiness().into()
    }
}
