//! Events flowing out of the session context and into each capture.
//!
//! Two streams:
//! - [`CaptureEvent`]: platform callbacks for one capture request, in the
//!   order the platform delivers them.
//! - [`SessionEvent`]: notifications for the UI context. The UI never reads
//!   session state directly, only these events and snapshots.

use std::path::PathBuf;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::ConfigurationFailure;
use crate::session::{InterruptionReason, SessionState};
use crate::settings::{RequestId, ResolvedSettings};

/// Platform callback for one in-flight capture.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// Capture accepted; reports what the platform resolved.
    WillBegin(ResolvedSettings),
    /// Shutter is about to fire. Drives the pre-capture animation.
    WillCapture,
    /// Full photo data, or the reason it could not be produced.
    DidProducePhoto(Result<Bytes, String>),
    /// Deferred photo proxy data.
    DidProduceDeferredProxy(Result<Bytes, String>),
    /// Companion movie finished writing at the given path.
    DidFinishCompanionMovie(Result<PathBuf, String>),
    /// Terminal event. Carries the error if the capture failed.
    DidFinish(Option<String>),
}

impl CaptureEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureEvent::WillBegin(_) => "will_begin",
            CaptureEvent::WillCapture => "will_capture",
            CaptureEvent::DidProducePhoto(_) => "did_produce_photo",
            CaptureEvent::DidProduceDeferredProxy(_) => "did_produce_deferred_proxy",
            CaptureEvent::DidFinishCompanionMovie(_) => "did_finish_companion_movie",
            CaptureEvent::DidFinish(_) => "did_finish",
        }
    }
}

/// How a finished capture was stored in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Photo,
    DeferredPhotoProxy,
}

/// Terminal session problems shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "alert", rename_all = "snake_case")]
pub enum SessionAlert {
    NotAuthorized,
    ConfigurationFailed { failure: ConfigurationFailure },
    ResumeFailed,
}

/// Notification from the session context to the UI context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Alert {
        alert: SessionAlert,
    },
    InterruptionBegan {
        reason: InterruptionReason,
        resume_available: bool,
    },
    InterruptionEnded,
    CaptureWillBegin {
        id: RequestId,
        live: bool,
    },
    ShutterAnimation {
        id: RequestId,
    },
    PhotoProduced {
        id: RequestId,
    },
    LivePhotosInProgress {
        count: usize,
    },
    LivePhotoCounterUnderflow {
        id: RequestId,
    },
    CaptureFinished {
        id: RequestId,
    },
    CaptureFailed {
        id: RequestId,
        reason: String,
    },
    CaptureSaved {
        id: RequestId,
        resource_type: ResourceType,
    },
    SaveFailed {
        id: RequestId,
        reason: String,
    },
}

/// Sink for session events.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: SessionEvent);
}

impl EventPublisher for broadcast::Sender<SessionEvent> {
    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine; the UI may attach later.
        if let Err(e) = self.send(event) {
            trace!("session event dropped, no subscribers: {:?}", e.0);
        }
    }
}

/// Publisher that drops everything.
pub struct NoOpPublisher;

impl EventPublisher for NoOpPublisher {
    fn publish(&self, _event: SessionEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_publisher_delivers() {
        let (tx, mut rx) = broadcast::channel(4);
        tx.publish(SessionEvent::InterruptionEnded);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::InterruptionEnded);
    }

    #[test]
    fn test_broadcast_publisher_without_subscribers() {
        let (tx, rx) = broadcast::channel::<SessionEvent>(4);
        drop(rx);
        tx.publish(SessionEvent::LivePhotosInProgress { count: 1 });
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(SessionEvent::CaptureSaved {
            id: RequestId(3),
            resource_type: ResourceType::DeferredPhotoProxy,
        })
        .unwrap();
        assert_eq!(json["event"], "capture_saved");
        assert_eq!(json["id"], 3);
        assert_eq!(json["resource_type"], "deferred_photo_proxy");
    }
}
