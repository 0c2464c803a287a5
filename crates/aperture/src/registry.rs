//! In-flight capture registry.
//!
//! Keeps each capture's payload and companion movie reachable across the
//! platform's multi-callback sequence, keyed by request id. Per id the order
//! is always register, any number of record calls, then one finalize.
//! Finalize on an absent id is a no-op, so a duplicated terminal callback
//! cannot free a slot twice.

use std::collections::HashMap;
use std::path::PathBuf;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::error::RegistryError;
use crate::events::ResourceType;
use crate::settings::{CaptureRequest, RequestId, ResolvedSettings};

/// Processor state for one capture.
#[derive(Debug, Clone)]
pub struct InFlightCapture {
    pub request: CaptureRequest,
    pub photo_data: Option<Bytes>,
    pub deferred_proxy_data: Option<Bytes>,
    pub companion_movie: Option<PathBuf>,
    pub resolved: Option<ResolvedSettings>,
    /// Counted in the live-photo counter and not yet released.
    pub live_in_progress: bool,
}

impl InFlightCapture {
    fn new(request: CaptureRequest) -> Self {
        Self {
            request,
            photo_data: None,
            deferred_proxy_data: None,
            companion_movie: None,
            resolved: None,
            live_in_progress: false,
        }
    }
}

/// Payload ready for the photo library.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturePayload {
    pub data: Bytes,
    pub resource_type: ResourceType,
}

/// What a capture leaves behind once its slot is released.
#[derive(Debug, Clone)]
pub struct FinalizedCapture {
    pub request: CaptureRequest,
    pub payload: Option<CapturePayload>,
    /// Companion movie the platform reported as finished.
    pub companion_movie: Option<PathBuf>,
    /// Whether the capture still held a live-photo count when finalized.
    pub live_in_progress: bool,
}

impl FinalizedCapture {
    /// File to remove once the save settles. Falls back to the assigned
    /// path when the platform never reported one, since a failed recording
    /// can still leave a partial file.
    pub fn cleanup_path(&self) -> Option<&PathBuf> {
        self.companion_movie
            .as_ref()
            .or(self.request.companion_movie_path.as_ref())
    }
}

#[derive(Default)]
pub struct CaptureRegistry {
    entries: HashMap<RequestId, InFlightCapture>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new in-flight capture. A live id is never replaced.
    pub fn register(&mut self, request: CaptureRequest) -> Result<(), RegistryError> {
        let id = request.id;
        if self.entries.contains_key(&id) {
            warn!("{}: already registered, rejecting duplicate", id);
            return Err(RegistryError::Duplicate(id));
        }
        self.entries.insert(id, InFlightCapture::new(request));
        trace!("{}: registered, {} in flight", id, self.entries.len());
        Ok(())
    }

    pub fn record_resolved(&mut self, id: RequestId, resolved: ResolvedSettings) -> bool {
        self.with_entry(id, "resolved settings", |entry| entry.resolved = Some(resolved))
    }

    pub fn record_photo_data(&mut self, id: RequestId, data: Bytes) -> bool {
        self.with_entry(id, "photo data", |entry| entry.photo_data = Some(data))
    }

    pub fn record_deferred_proxy_data(&mut self, id: RequestId, data: Bytes) -> bool {
        self.with_entry(id, "deferred proxy data", |entry| {
            entry.deferred_proxy_data = Some(data)
        })
    }

    pub fn record_companion_movie(&mut self, id: RequestId, path: PathBuf) -> bool {
        self.with_entry(id, "companion movie", |entry| entry.companion_movie = Some(path))
    }

    /// Mark or clear the live-photo count held by a capture.
    pub fn set_live_in_progress(&mut self, id: RequestId, live: bool) -> bool {
        self.with_entry(id, "live progress", |entry| entry.live_in_progress = live)
    }

    fn with_entry(
        &mut self,
        id: RequestId,
        what: &str,
        f: impl FnOnce(&mut InFlightCapture),
    ) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                f(entry);
                trace!("{}: recorded {}", id, what);
                true
            }
            None => {
                warn!("{}: {} for unknown capture, ignoring", id, what);
                false
            }
        }
    }

    /// Remove a capture and hand back what it collected.
    ///
    /// The resource type is a deferred proxy when the platform reported
    /// proxy dimensions for the capture, and a full photo otherwise.
    pub fn finalize(&mut self, id: RequestId) -> Option<FinalizedCapture> {
        let Some(entry) = self.entries.remove(&id) else {
            debug!("{}: finalize for absent capture, ignoring", id);
            return None;
        };

        let deferred = entry
            .resolved
            .is_some_and(|r| r.is_deferred_proxy());
        let payload = if deferred {
            entry.deferred_proxy_data.map(|data| CapturePayload {
                data,
                resource_type: ResourceType::DeferredPhotoProxy,
            })
        } else {
            entry.photo_data.map(|data| CapturePayload {
                data,
                resource_type: ResourceType::Photo,
            })
        };

        trace!("{}: finalized, {} in flight", id, self.entries.len());
        Some(FinalizedCapture {
            request: entry.request,
            payload,
            companion_movie: entry.companion_movie,
            live_in_progress: entry.live_in_progress,
        })
    }

    pub fn get(&self, id: RequestId) -> Option<&InFlightCapture> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every entry, e.g. when the session shuts down.
    pub fn drain(&mut self) -> Vec<FinalizedCapture> {
        let ids: Vec<RequestId> = self.entries.keys().copied().collect();
        ids.into_iter().filter_map(|id| self.finalize(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Dimensions, PhotoSettings};
    use chrono::Utc;

    fn request(id: u64, movie: Option<&str>) -> CaptureRequest {
        CaptureRequest {
            id: RequestId(id),
            settings: PhotoSettings::default(),
            location: None,
            rotation_angle: 90.0,
            companion_movie_path: movie.map(PathBuf::from),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_duplicate_register_rejected() {
        let mut registry = CaptureRegistry::new();
        registry.register(request(1, None)).unwrap();
        registry.record_photo_data(RequestId(1), Bytes::from_static(b"first"));

        let err = registry.register(request(1, Some("/tmp/x.mov"))).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate(RequestId(1)));
        assert_eq!(registry.len(), 1);

        // Original entry untouched
        let entry = registry.get(RequestId(1)).unwrap();
        assert_eq!(entry.photo_data.as_deref(), Some(&b"first"[..]));
        assert!(entry.request.companion_movie_path.is_none());
    }

    #[test]
    fn test_record_for_unknown_id_is_noop() {
        let mut registry = CaptureRegistry::new();
        assert!(!registry.record_photo_data(RequestId(7), Bytes::from_static(b"x")));
        assert!(!registry.record_companion_movie(RequestId(7), PathBuf::from("/tmp/a.mov")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_finalize_returns_photo_payload() {
        let mut registry = CaptureRegistry::new();
        registry.register(request(1, None)).unwrap();
        registry.record_photo_data(RequestId(1), Bytes::from_static(b"jpeg"));

        let done = registry.finalize(RequestId(1)).unwrap();
        assert_eq!(
            done.payload,
            Some(CapturePayload {
                data: Bytes::from_static(b"jpeg"),
                resource_type: ResourceType::Photo,
            })
        );
        assert!(done.companion_movie.is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_finalize_prefers_proxy_when_reported() {
        let mut registry = CaptureRegistry::new();
        registry.register(request(1, None)).unwrap();
        registry.record_resolved(
            RequestId(1),
            ResolvedSettings {
                deferred_proxy_dimensions: Some(Dimensions::new(1024, 768)),
                ..ResolvedSettings::default()
            },
        );
        registry.record_photo_data(RequestId(1), Bytes::from_static(b"full"));
        registry.record_deferred_proxy_data(RequestId(1), Bytes::from_static(b"proxy"));

        let payload = registry.finalize(RequestId(1)).unwrap().payload.unwrap();
        assert_eq!(payload.resource_type, ResourceType::DeferredPhotoProxy);
        assert_eq!(payload.data, Bytes::from_static(b"proxy"));
    }

    #[test]
    fn test_finalize_without_payload_still_frees_slot() {
        let mut registry = CaptureRegistry::new();
        registry.register(request(1, Some("/tmp/live-1.mov"))).unwrap();

        let done = registry.finalize(RequestId(1)).unwrap();
        assert!(done.payload.is_none());
        assert!(done.companion_movie.is_none());
        assert_eq!(done.cleanup_path(), Some(&PathBuf::from("/tmp/live-1.mov")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_finalize_twice_is_noop() {
        let mut registry = CaptureRegistry::new();
        registry.register(request(1, None)).unwrap();
        assert!(registry.finalize(RequestId(1)).is_some());
        assert!(registry.finalize(RequestId(1)).is_none());
    }

    #[test]
    fn test_reported_companion_path_wins() {
        let mut registry = CaptureRegistry::new();
        registry.register(request(1, Some("/tmp/assigned.mov"))).unwrap();
        registry.record_companion_movie(RequestId(1), PathBuf::from("/tmp/reported.mov"));

        let done = registry.finalize(RequestId(1)).unwrap();
        assert_eq!(done.companion_movie, Some(PathBuf::from("/tmp/reported.mov")));
        assert_eq!(done.cleanup_path(), Some(&PathBuf::from("/tmp/reported.mov")));
    }

    #[test]
    fn test_finalize_leaves_other_entries() {
        let mut registry = CaptureRegistry::new();
        registry.register(request(1, Some("/tmp/one.mov"))).unwrap();
        registry.register(request(2, Some("/tmp/two.mov"))).unwrap();
        registry.record_photo_data(RequestId(2), Bytes::from_static(b"two"));

        registry.finalize(RequestId(1));

        let remaining = registry.get(RequestId(2)).unwrap();
        assert_eq!(remaining.photo_data.as_deref(), Some(&b"two"[..]));
        assert_eq!(
            remaining.request.companion_movie_path,
            Some(PathBuf::from("/tmp/two.mov"))
        );
    }

    #[test]
    fn test_drain() {
        let mut registry = CaptureRegistry::new();
        registry.register(request(1, None)).unwrap();
        registry.register(request(2, None)).unwrap();
        assert_eq!(registry.drain().len(), 2);
        assert!(registry.is_empty());
    }
}
