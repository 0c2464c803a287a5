//! Capture orchestration.
//!
//! Turns a capture request into a registered, submitted capture and walks
//! its platform events through to finalization. Owned by the session
//! execution context along with the registry and the live-photo counter.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CaptureError, RejectReason};
use crate::events::{CaptureEvent, EventPublisher, SessionEvent};
use crate::library::{remove_companion_movie, save_to_library};
use crate::platform::{
    CaptureCallbacks, LocationSource, PhotoLibrary, RotationSource, SaveRequest,
};
use crate::registry::{CaptureRegistry, FinalizedCapture};
use crate::session::SessionStateMachine;
use crate::settings::{
    CaptureRequest, Dimensions, PhotoOutputCapabilities, PhotoSettings, RequestId,
};

/// Extension for companion movie temp files.
pub const COMPANION_MOVIE_EXTENSION: &str = "mov";

#[derive(Debug, thiserror::Error)]
#[error("live photo counter decremented past zero")]
pub struct CounterUnderflow;

/// Number of Live Photo captures currently recording their companion movie.
#[derive(Debug, Default)]
pub struct LivePhotoCounter {
    count: usize,
}

impl LivePhotoCounter {
    pub fn increment(&mut self) -> usize {
        self.count += 1;
        self.count
    }

    /// Decrement, refusing to go below zero.
    pub fn decrement(&mut self) -> Result<usize, CounterUnderflow> {
        self.count = self.count.checked_sub(1).ok_or(CounterUnderflow)?;
        Ok(self.count)
    }

    pub fn get(&self) -> usize {
        self.count
    }
}

/// Derive the settings for one capture from the base settings.
///
/// The result is an independent copy clamped to what the photo output
/// supports; later edits to the base never reach it.
pub fn snapshot_settings(base: &PhotoSettings, caps: &PhotoOutputCapabilities) -> PhotoSettings {
    let mut settings = base.clone();
    settings.live_photo = base.live_photo && caps.live_photo_supported;
    settings.deferred_delivery = base.deferred_delivery && caps.deferred_delivery_supported;
    settings.quality = base.quality.min(caps.max_quality);
    settings.max_dimensions = Some(match base.max_dimensions {
        Some(d) => Dimensions::new(
            d.width.min(caps.max_dimensions.width),
            d.height.min(caps.max_dimensions.height),
        ),
        None => caps.max_dimensions,
    });
    settings
}

pub struct CaptureOrchestrator {
    registry: CaptureRegistry,
    live_photos: LivePhotoCounter,
    next_id: u64,
    temp_dir: PathBuf,
    library: Arc<dyn PhotoLibrary>,
    rotation: Arc<dyn RotationSource>,
    location: Arc<dyn LocationSource>,
    publisher: Arc<dyn EventPublisher>,
    callbacks_tx: mpsc::UnboundedSender<(RequestId, CaptureEvent)>,
}

impl CaptureOrchestrator {
    pub fn new(
        temp_dir: PathBuf,
        library: Arc<dyn PhotoLibrary>,
        rotation: Arc<dyn RotationSource>,
        location: Arc<dyn LocationSource>,
        publisher: Arc<dyn EventPublisher>,
        callbacks_tx: mpsc::UnboundedSender<(RequestId, CaptureEvent)>,
    ) -> Self {
        Self {
            registry: CaptureRegistry::new(),
            live_photos: LivePhotoCounter::default(),
            next_id: 1,
            temp_dir,
            library,
            rotation,
            location,
            publisher,
            callbacks_tx,
        }
    }

    pub fn registry(&self) -> &CaptureRegistry {
        &self.registry
    }

    pub fn live_photos_in_progress(&self) -> usize {
        self.live_photos.get()
    }

    /// Register a capture and hand it to the platform.
    ///
    /// Rejected without registering anything unless the session is
    /// configured or running.
    pub fn capture_photo(
        &mut self,
        session: &mut SessionStateMachine,
        base: &PhotoSettings,
    ) -> Result<RequestId, CaptureError> {
        let state = session.state();
        if !state.accepts_captures() {
            debug!("capture rejected, session is {:?}", state);
            return Err(CaptureError::SubmissionRejected(RejectReason::NotReady));
        }

        let caps = session.capabilities().unwrap_or_default();
        let settings = snapshot_settings(base, &caps);

        let id = RequestId(self.next_id);
        self.next_id += 1;

        let companion_movie_path = settings.live_photo.then(|| {
            self.temp_dir
                .join(format!("{}.{}", Uuid::new_v4(), COMPANION_MOVIE_EXTENSION))
        });

        let request = CaptureRequest {
            id,
            settings,
            location: self.location.current_location(),
            rotation_angle: self.rotation.capture_rotation_angle(),
            companion_movie_path,
            created_at: Utc::now(),
        };

        self.registry
            .register(request.clone())
            .map_err(|e| CaptureError::CaptureFailed {
                id,
                reason: e.to_string(),
            })?;

        let callbacks = CaptureCallbacks::new(id, self.callbacks_tx.clone());
        if let Err(e) = session.service_mut().submit_capture(&request, callbacks) {
            warn!("{}: platform rejected capture: {}", id, e);
            self.registry.finalize(id);
            return Err(CaptureError::CaptureFailed {
                id,
                reason: e.to_string(),
            });
        }

        info!(
            "{}: submitted ({:?}, live={}, rotation={})",
            id, request.settings.codec, request.is_live(), request.rotation_angle
        );
        Ok(id)
    }

    /// Apply one platform event. Returns the follow-up work once the
    /// capture reaches its terminal event.
    pub fn handle_event(&mut self, id: RequestId, event: CaptureEvent) -> Option<Finalization> {
        debug!("{}: {}", id, event.kind());
        match event {
            CaptureEvent::WillBegin(resolved) => {
                if !self.registry.record_resolved(id, resolved) {
                    return None;
                }
                let live = resolved.is_live();
                let counted = self
                    .registry
                    .get(id)
                    .is_some_and(|entry| entry.live_in_progress);
                if counted {
                    debug!("{}: duplicate begin for counted live capture", id);
                } else if live {
                    self.registry.set_live_in_progress(id, true);
                    let count = self.live_photos.increment();
                    self.publisher
                        .publish(SessionEvent::LivePhotosInProgress { count });
                }
                self.publisher
                    .publish(SessionEvent::CaptureWillBegin { id, live });
                None
            }
            CaptureEvent::WillCapture => {
                if self.registry.contains(id) {
                    self.publisher.publish(SessionEvent::ShutterAnimation { id });
                }
                None
            }
            CaptureEvent::DidProducePhoto(Ok(data)) => {
                if self.registry.record_photo_data(id, data) {
                    self.publisher.publish(SessionEvent::PhotoProduced { id });
                }
                None
            }
            CaptureEvent::DidProducePhoto(Err(e)) => {
                warn!("{}: error producing photo: {}", id, e);
                None
            }
            CaptureEvent::DidProduceDeferredProxy(Ok(data)) => {
                if self.registry.record_deferred_proxy_data(id, data) {
                    self.publisher.publish(SessionEvent::PhotoProduced { id });
                }
                None
            }
            CaptureEvent::DidProduceDeferredProxy(Err(e)) => {
                warn!("{}: error producing deferred proxy: {}", id, e);
                None
            }
            CaptureEvent::DidFinishCompanionMovie(result) => {
                match result {
                    Ok(path) => {
                        self.registry.record_companion_movie(id, path);
                    }
                    Err(e) => warn!("{}: error processing companion movie: {}", id, e),
                }
                self.release_live_photo(id);
                None
            }
            CaptureEvent::DidFinish(error) => self.finish(id, error),
        }
    }

    fn release_live_photo(&mut self, id: RequestId) {
        match self.registry.get(id) {
            Some(entry) if entry.live_in_progress => {
                self.registry.set_live_in_progress(id, false);
                self.decrement_live_photos(id);
            }
            Some(_) => debug!("{}: companion movie for uncounted capture", id),
            None => {}
        }
    }

    fn decrement_live_photos(&mut self, id: RequestId) {
        match self.live_photos.decrement() {
            Ok(count) => self
                .publisher
                .publish(SessionEvent::LivePhotosInProgress { count }),
            Err(e) => {
                warn!("{}: {}", id, e);
                self.publisher
                    .publish(SessionEvent::LivePhotoCounterUnderflow { id });
            }
        }
    }

    fn finish(&mut self, id: RequestId, error: Option<String>) -> Option<Finalization> {
        let Some(done) = self.registry.finalize(id) else {
            debug!("{}: duplicate terminal event, ignoring", id);
            return None;
        };
        if done.live_in_progress {
            self.decrement_live_photos(id);
        }
        self.publisher.publish(SessionEvent::CaptureFinished { id });

        let failure = match (&error, &done.payload) {
            (Some(e), _) => Some(e.clone()),
            (None, None) => Some("no photo data".to_string()),
            (None, Some(_)) => None,
        };
        if let Some(reason) = failure {
            let err = CaptureError::CaptureFailed {
                id,
                reason: reason.clone(),
            };
            warn!("{}", err);
            self.publisher
                .publish(SessionEvent::CaptureFailed { id, reason });
            return Some(self.finalization(done, false));
        }

        Some(self.finalization(done, true))
    }

    fn finalization(&self, done: FinalizedCapture, save: bool) -> Finalization {
        let cleanup = done.cleanup_path().cloned();
        let FinalizedCapture {
            request,
            payload,
            companion_movie,
            ..
        } = done;

        let save = payload.filter(|_| save).map(|payload| SaveRequest {
            id: request.id,
            data: payload.data,
            resource_type: payload.resource_type,
            companion_movie,
            location: request.location,
            file_extension: request.settings.codec.extension(),
            created_at: request.created_at,
        });

        Finalization {
            id: request.id,
            save,
            companion_movie: cleanup,
            library: Arc::clone(&self.library),
            publisher: Arc::clone(&self.publisher),
        }
    }

    /// Release every in-flight capture without saving, e.g. on shutdown.
    pub fn abandon_all(&mut self) -> Vec<Finalization> {
        let drained = self.registry.drain();
        drained
            .into_iter()
            .map(|done| {
                let id = done.request.id;
                if done.live_in_progress {
                    self.decrement_live_photos(id);
                }
                self.finalization(done, false)
            })
            .collect()
    }
}

/// Work left once a capture's registry slot is released: save the payload
/// (if any), then remove the companion movie whatever the save outcome.
pub struct Finalization {
    pub id: RequestId,
    pub save: Option<SaveRequest>,
    pub companion_movie: Option<PathBuf>,
    library: Arc<dyn PhotoLibrary>,
    publisher: Arc<dyn EventPublisher>,
}

#[derive(Debug)]
pub struct FinalizationOutcome {
    pub id: RequestId,
    /// None when nothing was handed to the library.
    pub save: Option<Result<(), CaptureError>>,
    pub cleanup: Result<(), CaptureError>,
}

impl Finalization {
    pub async fn run(self) -> FinalizationOutcome {
        let save = match &self.save {
            Some(request) => {
                let result = save_to_library(self.library.as_ref(), request).await;
                match &result {
                    Ok(()) => {
                        info!("{}: saved to photo library", self.id);
                        self.publisher.publish(SessionEvent::CaptureSaved {
                            id: self.id,
                            resource_type: request.resource_type,
                        });
                    }
                    Err(e) => {
                        warn!("{}", e);
                        self.publisher.publish(SessionEvent::SaveFailed {
                            id: self.id,
                            reason: e.to_string(),
                        });
                    }
                }
                Some(result)
            }
            None => None,
        };

        let cleanup = match &self.companion_movie {
            Some(path) => remove_companion_movie(path).await,
            None => Ok(()),
        };
        if let Err(e) = &cleanup {
            // Temp artifact; never surfaced to the user.
            warn!("{}: {}", self.id, e);
        }

        FinalizationOutcome {
            id: self.id,
            save,
            cleanup,
        }
    }
}
