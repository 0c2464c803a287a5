//! Persisted preferences (the discovered default camera).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PreferenceError;
use crate::platform::{CameraPreference, PreferenceStore};

/// On-disk layout of the preferences file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    camera: Option<CameraPreference>,
}

/// Preferences stored as a TOML file, typically under the state dir.
pub struct FilePreferenceStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<PreferencesFile, PreferenceError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PreferencesFile::default())
            }
            Err(e) => {
                return Err(PreferenceError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        toml::from_str(&contents).map_err(|e| PreferenceError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn write(&self, file: &PreferencesFile) -> Result<(), PreferenceError> {
        let io_err = |source| PreferenceError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = toml::to_string(file).map_err(|e| PreferenceError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&self.path, contents).map_err(io_err)
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn camera_preference(&self) -> Option<CameraPreference> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match self.read() {
            Ok(file) => file.camera,
            Err(e) => {
                warn!("Ignoring unreadable preferences: {}", e);
                None
            }
        }
    }

    fn set_camera_preference(&self, preference: CameraPreference) -> Result<(), PreferenceError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        // A corrupt file gets replaced rather than blocking the save.
        let mut file = self.read().unwrap_or_default();
        file.camera = Some(preference);
        self.write(&file)
    }
}

/// Preferences held in memory for the life of the process.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    camera: Mutex<Option<CameraPreference>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preference(preference: CameraPreference) -> Self {
        Self {
            camera: Mutex::new(Some(preference)),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn camera_preference(&self) -> Option<CameraPreference> {
        self.camera
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_camera_preference(&self, preference: CameraPreference) -> Result<(), PreferenceError> {
        *self.camera.lock().unwrap_or_else(|e| e.into_inner()) = Some(preference);
        Ok(())
    }
}
