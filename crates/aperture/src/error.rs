//! Error types for the capture core.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::settings::RequestId;

/// Why session configuration failed. Terminal for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum ConfigurationFailure {
    #[error("no usable video device")]
    NoVideoDevice,

    #[error("video input rejected: {0}")]
    VideoInputRejected(String),

    #[error("photo output rejected: {0}")]
    PhotoOutputRejected(String),
}

/// Why a capture submission was turned away before it was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
pub enum RejectReason {
    #[error("session not ready")]
    NotReady,
}

/// Errors surfaced by the session and capture pipeline.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera access not authorized")]
    NotAuthorized,

    #[error("session configuration failed: {0}")]
    ConfigurationFailed(ConfigurationFailure),

    #[error("capture submission rejected: {0}")]
    SubmissionRejected(RejectReason),

    #[error("capture {id} failed: {reason}")]
    CaptureFailed { id: RequestId, reason: String },

    #[error("saving capture {id} failed: {reason}")]
    SaveFailed { id: RequestId, reason: String },

    #[error("failed to remove companion movie {path}: {source}")]
    CompanionMovieCleanupFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("session could not be resumed")]
    ResumeFailed,

    #[error("session is shut down")]
    SessionClosed,
}

/// Errors reported by the media capture service collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("input rejected: {0}")]
    InputRejected(String),

    #[error("output rejected: {0}")]
    OutputRejected(String),

    #[error("capture rejected: {0}")]
    CaptureRejected(String),
}

/// Errors from the in-flight capture registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("capture {0} is already registered")]
    Duplicate(RequestId),
}

/// Errors from reading or writing persisted preferences.
#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("failed to access preferences at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse preferences at {path}: {message}")]
    Parse { path: PathBuf, message: String },
}
