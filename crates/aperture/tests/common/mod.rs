//! Shared setup for session integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aperture::simulated::{
    DirectoryLibrary, FixedLocation, SimulatedCaptureService, SimulatorControl, StaticPermissions,
};
use aperture::{
    GeoLocation, LibraryAuthorization, MemoryPreferenceStore, PhotoSettings, RotationTracker,
    SessionEvent, SessionHandle, SessionOptions, SessionParts,
};
use tempfile::TempDir;
use tokio::sync::broadcast;

pub struct Rig {
    pub session: SessionHandle,
    pub events: broadcast::Receiver<SessionEvent>,
    pub control: SimulatorControl,
    pub library: Arc<DirectoryLibrary>,
    pub rotation: Arc<RotationTracker>,
    pub dir: TempDir,
}

impl Rig {
    pub fn temp_dir(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    pub fn library_dir(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    /// Wait for the first event matching `pred`, skipping everything else.
    pub async fn wait_for(&mut self, pred: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
        let wait = async {
            loop {
                match self.events.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(e) => panic!("event stream ended: {e}"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("timed out waiting for session event")
    }

    /// Everything published so far, without waiting.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn wait_idle(&self) {
        let wait = async {
            loop {
                let snapshot = self.session.snapshot().await.unwrap();
                if snapshot.in_flight_requests == 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("captures still in flight");
    }
}

pub struct RigBuilder {
    permissions: StaticPermissions,
    library_status: LibraryAuthorization,
    settings: PhotoSettings,
    control: SimulatorControl,
}

impl RigBuilder {
    pub fn new() -> Self {
        Self {
            permissions: StaticPermissions::authorized(),
            library_status: LibraryAuthorization::Authorized,
            settings: PhotoSettings {
                live_photo: false,
                ..PhotoSettings::default()
            },
            control: SimulatorControl::new(),
        }
    }

    pub fn permissions(mut self, permissions: StaticPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn library_status(mut self, status: LibraryAuthorization) -> Self {
        self.library_status = status;
        self
    }

    pub fn settings(mut self, settings: PhotoSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn control(&self) -> &SimulatorControl {
        &self.control
    }

    pub fn build(self) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let library = Arc::new(DirectoryLibrary::new(
            dir.path().join("library"),
            self.library_status,
        ));
        let rotation = Arc::new(RotationTracker::new(90.0));

        let parts = SessionParts {
            service: Box::new(SimulatedCaptureService::new(self.control.clone())),
            permissions: Arc::new(self.permissions),
            prefs: Arc::new(MemoryPreferenceStore::new()),
            library: library.clone(),
            rotation: rotation.clone(),
            location: Arc::new(FixedLocation(Some(GeoLocation {
                latitude: 47.6,
                longitude: -122.3,
                altitude: Some(56.0),
            }))),
        };
        let options = SessionOptions {
            temp_dir: dir.path().join("tmp"),
            base_settings: self.settings,
            ..SessionOptions::default()
        };

        let session = SessionHandle::spawn(parts, options);
        let events = session.subscribe();
        Rig {
            session,
            events,
            control: self.control,
            library,
            rotation,
            dir,
        }
    }
}

/// A configured, running session with default collaborators.
pub async fn running(builder: RigBuilder) -> Rig {
    let rig = builder.build();
    rig.session.configure().await.unwrap();
    rig.session.start().await.unwrap();
    rig
}

/// File names in `dir` with the given extension, sorted.
pub fn files_with_extension(dir: &Path, ext: &str) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == ext))
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    names
}
