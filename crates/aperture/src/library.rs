//! Photo library hand-off.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::CaptureError;
use crate::platform::{LibraryAuthorization, PhotoLibrary, SaveRequest};

/// Save a finished capture, gated on library authorization.
///
/// Only `Authorized` reaches [`PhotoLibrary::write`]; every other status
/// fails without touching the library.
pub async fn save_to_library(
    library: &dyn PhotoLibrary,
    request: &SaveRequest,
) -> Result<(), CaptureError> {
    let status = library.authorization_status().await;
    if status != LibraryAuthorization::Authorized {
        warn!("{}: photo library access is {:?}, not saving", request.id, status);
        return Err(CaptureError::SaveFailed {
            id: request.id,
            reason: format!("photo library access is {:?}", status),
        });
    }

    library
        .write(request)
        .await
        .map_err(|reason| CaptureError::SaveFailed {
            id: request.id,
            reason,
        })
}

/// Delete a companion movie temp file. A file that is already gone is fine.
pub async fn remove_companion_movie(path: &Path) -> Result<(), CaptureError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed companion movie {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CaptureError::CompanionMovieCleanupFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}
