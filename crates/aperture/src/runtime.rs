//! Session execution context.
//!
//! Reactor pattern: one task owns the [`SessionStateMachine`] and the
//! [`CaptureOrchestrator`], so session configuration and registry entries
//! are only ever touched serially. Callers hold a cloneable
//! [`SessionHandle`]:
//! - commands flow through an mpsc channel
//! - replies come back on oneshot channels
//! - state changes go out as [`SessionEvent`]s on a broadcast channel
//!
//! Usage:
//! ```ignore
//! let session = SessionHandle::spawn(parts, SessionOptions::default());
//! let mut events = session.subscribe();
//! session.configure().await?;
//! session.start().await?;
//! let id = session.capture_photo().await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use apertureconf::ApertureConfig;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::error::CaptureError;
use crate::events::{CaptureEvent, EventPublisher, SessionEvent};
use crate::orchestrator::{CaptureOrchestrator, FinalizationOutcome};
use crate::platform::{
    LocationSource, MediaCaptureService, PermissionProvider, PhotoLibrary, PreferenceStore,
    RotationSource,
};
use crate::session::{PlatformSignal, SessionSnapshot, SessionState, SessionStateMachine};
use crate::settings::{PhotoSettings, RequestId};

/// Collaborators the session context is built from.
pub struct SessionParts {
    pub service: Box<dyn MediaCaptureService>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub prefs: Arc<dyn PreferenceStore>,
    pub library: Arc<dyn PhotoLibrary>,
    pub rotation: Arc<dyn RotationSource>,
    pub location: Arc<dyn LocationSource>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Where companion movies are recorded before they are saved.
    pub temp_dir: PathBuf,
    pub base_settings: PhotoSettings,
    /// Broadcast buffer for session events.
    pub event_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("aperture"),
            base_settings: PhotoSettings::default(),
            event_capacity: 256,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &ApertureConfig) -> Self {
        Self {
            temp_dir: config.infra.paths.temp_dir.clone(),
            base_settings: PhotoSettings::from_config(&config.capture),
            ..Self::default()
        }
    }
}

/// Command sent to the session task.
enum SessionCommand {
    Configure {
        reply: oneshot::Sender<Result<(), CaptureError>>,
    },
    Start {
        reply: oneshot::Sender<Result<SessionState, CaptureError>>,
    },
    Stop {
        reply: oneshot::Sender<SessionState>,
    },
    Resume {
        reply: oneshot::Sender<Result<SessionState, CaptureError>>,
    },
    Signal {
        signal: PlatformSignal,
        reply: oneshot::Sender<SessionState>,
    },
    CapturePhoto {
        reply: oneshot::Sender<Result<RequestId, CaptureError>>,
    },
    UpdateSettings {
        settings: PhotoSettings,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Spawn the session task. Must be called within a tokio runtime.
    pub fn spawn(parts: SessionParts, options: SessionOptions) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(options.event_capacity.max(1));

        let publisher: Arc<dyn EventPublisher> = Arc::new(events.clone());
        let machine = SessionStateMachine::new(parts.service, parts.prefs, publisher.clone());

        if let Err(e) = std::fs::create_dir_all(&options.temp_dir) {
            warn!(
                "Failed to create temp dir {}: {}",
                options.temp_dir.display(),
                e
            );
        }
        let orchestrator = CaptureOrchestrator::new(
            options.temp_dir,
            parts.library,
            parts.rotation,
            parts.location,
            publisher,
            capture_tx,
        );

        let reactor = Reactor {
            machine,
            orchestrator,
            permissions: parts.permissions,
            base_settings: options.base_settings,
            finalizing: JoinSet::new(),
        };
        tokio::spawn(reactor.run(cmd_rx, capture_rx));

        Self { cmd_tx, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, CaptureError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(command(reply))
            .await
            .map_err(|_| CaptureError::SessionClosed)?;
        rx.await.map_err(|_| CaptureError::SessionClosed)
    }

    /// Check camera authorization (prompting if undecided), then configure.
    ///
    /// Commands queued behind this one wait for the prompt to resolve.
    pub async fn configure(&self) -> Result<(), CaptureError> {
        self.call(|reply| SessionCommand::Configure { reply }).await?
    }

    pub async fn start(&self) -> Result<SessionState, CaptureError> {
        self.call(|reply| SessionCommand::Start { reply }).await?
    }

    pub async fn stop(&self) -> Result<SessionState, CaptureError> {
        self.call(|reply| SessionCommand::Stop { reply }).await
    }

    /// User-initiated resume after an interruption.
    pub async fn resume(&self) -> Result<SessionState, CaptureError> {
        self.call(|reply| SessionCommand::Resume { reply }).await?
    }

    /// Deliver a platform lifecycle notification.
    pub async fn signal(&self, signal: PlatformSignal) -> Result<SessionState, CaptureError> {
        self.call(|reply| SessionCommand::Signal { signal, reply })
            .await
    }

    /// Capture with the current base settings.
    pub async fn capture_photo(&self) -> Result<RequestId, CaptureError> {
        self.call(|reply| SessionCommand::CapturePhoto { reply })
            .await?
    }

    /// Replace the base settings. Captures already in flight keep theirs.
    pub async fn update_settings(&self, settings: PhotoSettings) -> Result<(), CaptureError> {
        self.call(|reply| SessionCommand::UpdateSettings { settings, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, CaptureError> {
        self.call(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Stop the session, release leftover companion files and end the task.
    pub async fn shutdown(&self) -> Result<(), CaptureError> {
        self.call(|reply| SessionCommand::Shutdown { reply }).await
    }
}

struct Reactor {
    machine: SessionStateMachine,
    orchestrator: CaptureOrchestrator,
    permissions: Arc<dyn PermissionProvider>,
    base_settings: PhotoSettings,
    finalizing: JoinSet<FinalizationOutcome>,
}

impl Reactor {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<SessionCommand>,
        mut capture_rx: mpsc::UnboundedReceiver<(RequestId, CaptureEvent)>,
    ) {
        debug!("Session task started");

        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd).await {
                                break;
                            }
                        }
                        None => {
                            info!("All session handles dropped, shutting down");
                            self.shutdown().await;
                            break;
                        }
                    }
                }

                Some((id, event)) = capture_rx.recv() => {
                    if let Some(finalization) = self.orchestrator.handle_event(id, event) {
                        self.finalizing.spawn(finalization.run());
                    }
                }

                Some(joined) = self.finalizing.join_next(), if !self.finalizing.is_empty() => {
                    log_outcome(joined);
                }
            }
        }

        debug!("Session task exited");
    }

    /// Returns false once the session has shut down.
    async fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::Configure { reply } => {
                // Awaited inline: no further commands are pulled until the
                // user answers the permission prompt.
                self.machine.authorize(self.permissions.as_ref()).await;
                let _ = reply.send(self.machine.configure());
            }
            SessionCommand::Start { reply } => {
                let _ = reply.send(self.machine.start());
            }
            SessionCommand::Stop { reply } => {
                let _ = reply.send(self.machine.stop());
            }
            SessionCommand::Resume { reply } => {
                let _ = reply.send(self.machine.resume());
            }
            SessionCommand::Signal { signal, reply } => {
                trace!("Platform signal {:?}", signal);
                self.machine.handle_signal(signal);
                let _ = reply.send(self.machine.state());
            }
            SessionCommand::CapturePhoto { reply } => {
                let result = self
                    .orchestrator
                    .capture_photo(&mut self.machine, &self.base_settings);
                let _ = reply.send(result);
            }
            SessionCommand::UpdateSettings { settings, reply } => {
                debug!("Base settings updated: {:?}", settings);
                self.base_settings = settings;
                let _ = reply.send(());
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(SessionSnapshot {
                    state: self.machine.state(),
                    setup_result: self.machine.setup_result(),
                    in_flight_requests: self.orchestrator.registry().len(),
                    live_photos_in_progress: self.orchestrator.live_photos_in_progress(),
                });
            }
            SessionCommand::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn shutdown(&mut self) {
        self.machine.stop();

        let abandoned = self.orchestrator.abandon_all();
        if !abandoned.is_empty() {
            info!("Releasing {} in-flight captures", abandoned.len());
        }
        for finalization in abandoned {
            self.finalizing.spawn(finalization.run());
        }

        while let Some(joined) = self.finalizing.join_next().await {
            log_outcome(joined);
        }
    }
}

fn log_outcome(joined: Result<FinalizationOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => trace!(
            "{}: finalized (saved: {:?}, cleaned: {})",
            outcome.id,
            outcome.save.as_ref().map(|r| r.is_ok()),
            outcome.cleanup.is_ok()
        ),
        Err(e) => warn!("Finalization task failed: {}", e),
    }
}
