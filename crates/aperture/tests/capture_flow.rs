//! End-to-end capture flow against the simulated platform

mod common;

use std::collections::HashSet;
use std::time::Duration;

use aperture::{
    LibraryAuthorization, PhotoCodec, PhotoSettings, ResourceType, SessionEvent,
};
use common::{files_with_extension, running, RigBuilder};
use pretty_assertions::assert_eq;

fn live() -> PhotoSettings {
    PhotoSettings {
        live_photo: true,
        ..PhotoSettings::default()
    }
}

#[tokio::test]
async fn test_still_photo_is_saved() {
    let mut rig = running(RigBuilder::new()).await;

    let id = rig.session.capture_photo().await.unwrap();
    let saved = rig
        .wait_for(|e| matches!(e, SessionEvent::CaptureSaved { .. }))
        .await;
    assert_eq!(
        saved,
        SessionEvent::CaptureSaved {
            id,
            resource_type: ResourceType::Photo
        }
    );
    rig.wait_idle().await;

    let library = rig.library_dir();
    assert_eq!(files_with_extension(&library, "heic"), vec![format!("{id}.heic")]);
    assert!(files_with_extension(&library, "mov").is_empty());

    let sidecar: serde_json::Value = serde_json::from_slice(
        &std::fs::read(library.join(format!("{id}.json"))).unwrap(),
    )
    .unwrap();
    assert_eq!(sidecar["resource_type"], "photo");
    assert_eq!(sidecar["location"]["latitude"], 47.6);

    let photo = std::fs::read_to_string(library.join(format!("{id}.heic"))).unwrap();
    assert!(photo.contains("rotation=90"));
}

#[tokio::test]
async fn test_live_photo_saves_movie_and_cleans_temp() {
    let mut rig = running(RigBuilder::new().settings(live())).await;

    let id = rig.session.capture_photo().await.unwrap();
    rig.wait_for(|e| *e == SessionEvent::LivePhotosInProgress { count: 1 })
        .await;
    rig.wait_for(|e| *e == SessionEvent::CaptureWillBegin { id, live: true })
        .await;
    rig.wait_for(|e| *e == SessionEvent::LivePhotosInProgress { count: 0 })
        .await;
    rig.wait_for(|e| matches!(e, SessionEvent::CaptureSaved { .. }))
        .await;

    let temp = rig.temp_dir();
    rig.session.shutdown().await.unwrap();

    assert_eq!(
        files_with_extension(&rig.library_dir(), "mov"),
        vec![format!("{id}.mov")]
    );
    assert!(files_with_extension(&temp, "mov").is_empty());
}

#[tokio::test]
async fn test_overlapping_live_captures() {
    let mut rig = running(RigBuilder::new().settings(live())).await;
    rig.control.set_latency(Duration::from_millis(30));

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(rig.session.capture_photo().await.unwrap());
    }
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), 3);

    let snapshot = rig.session.snapshot().await.unwrap();
    assert_eq!(snapshot.in_flight_requests, 3);

    let mut saved = HashSet::new();
    while saved.len() < 3 {
        if let SessionEvent::CaptureSaved { id, .. } = rig
            .wait_for(|e| matches!(e, SessionEvent::CaptureSaved { .. }))
            .await
        {
            saved.insert(id);
        }
    }
    rig.wait_idle().await;

    let snapshot = rig.session.snapshot().await.unwrap();
    assert_eq!(snapshot.live_photos_in_progress, 0);

    let temp = rig.temp_dir();
    rig.session.shutdown().await.unwrap();
    assert_eq!(files_with_extension(&rig.library_dir(), "mov").len(), 3);
    assert!(files_with_extension(&temp, "mov").is_empty());
}

#[tokio::test]
async fn test_capture_failure_releases_slot() {
    let mut rig = running(RigBuilder::new().settings(live())).await;
    rig.control.set_fail_captures(Some("sensor overheated".to_string()));

    let id = rig.session.capture_photo().await.unwrap();
    let failed = rig
        .wait_for(|e| matches!(e, SessionEvent::CaptureFailed { .. }))
        .await;
    assert_eq!(
        failed,
        SessionEvent::CaptureFailed {
            id,
            reason: "sensor overheated".to_string()
        }
    );
    rig.wait_idle().await;

    let snapshot = rig.session.snapshot().await.unwrap();
    assert_eq!(snapshot.live_photos_in_progress, 0);
    assert!(files_with_extension(&rig.library_dir(), "heic").is_empty());

    // The session keeps working
    rig.control.set_fail_captures(None);
    let next = rig.session.capture_photo().await.unwrap();
    assert_ne!(next, id);
    rig.wait_for(|e| matches!(e, SessionEvent::CaptureSaved { id, .. } if *id == next))
        .await;
}

#[tokio::test]
async fn test_companion_movie_failure_still_saves_photo() {
    let mut rig = running(RigBuilder::new().settings(live())).await;
    rig.control.set_fail_companion_movies(true);

    let id = rig.session.capture_photo().await.unwrap();
    rig.wait_for(|e| matches!(e, SessionEvent::CaptureSaved { .. }))
        .await;
    rig.wait_idle().await;

    assert_eq!(
        files_with_extension(&rig.library_dir(), "heic"),
        vec![format!("{id}.heic")]
    );
    let snapshot = rig.session.snapshot().await.unwrap();
    assert_eq!(snapshot.live_photos_in_progress, 0);
}

#[tokio::test]
async fn test_library_denied_still_cleans_up() {
    let mut rig = running(
        RigBuilder::new()
            .settings(live())
            .library_status(LibraryAuthorization::Limited),
    )
    .await;

    let id = rig.session.capture_photo().await.unwrap();
    let failed = rig
        .wait_for(|e| matches!(e, SessionEvent::SaveFailed { .. }))
        .await;
    assert!(matches!(failed, SessionEvent::SaveFailed { id: failed_id, .. } if failed_id == id));

    let temp = rig.temp_dir();
    rig.session.shutdown().await.unwrap();
    assert!(files_with_extension(&rig.library_dir(), "heic").is_empty());
    assert!(files_with_extension(&temp, "mov").is_empty());
}

#[tokio::test]
async fn test_deferred_proxy_resource_type() {
    let mut rig = running(RigBuilder::new().settings(PhotoSettings {
        live_photo: false,
        deferred_delivery: true,
        ..PhotoSettings::default()
    }))
    .await;

    let id = rig.session.capture_photo().await.unwrap();
    let saved = rig
        .wait_for(|e| matches!(e, SessionEvent::CaptureSaved { .. }))
        .await;
    assert_eq!(
        saved,
        SessionEvent::CaptureSaved {
            id,
            resource_type: ResourceType::DeferredPhotoProxy
        }
    );
}

#[tokio::test]
async fn test_settings_change_spares_in_flight_capture() {
    let mut rig = running(RigBuilder::new().settings(live())).await;
    rig.control.set_latency(Duration::from_millis(30));

    let first = rig.session.capture_photo().await.unwrap();
    rig.session
        .update_settings(PhotoSettings {
            codec: PhotoCodec::Jpeg,
            live_photo: false,
            ..PhotoSettings::default()
        })
        .await
        .unwrap();
    let second = rig.session.capture_photo().await.unwrap();

    let mut saved = HashSet::new();
    while saved.len() < 2 {
        if let SessionEvent::CaptureSaved { id, .. } = rig
            .wait_for(|e| matches!(e, SessionEvent::CaptureSaved { .. }))
            .await
        {
            saved.insert(id);
        }
    }

    let library = rig.library_dir();
    assert_eq!(files_with_extension(&library, "heic"), vec![format!("{first}.heic")]);
    assert_eq!(files_with_extension(&library, "jpg"), vec![format!("{second}.jpg")]);
    assert_eq!(files_with_extension(&library, "mov"), vec![format!("{first}.mov")]);
}

#[tokio::test]
async fn test_rotation_is_read_at_submission() {
    let mut rig = running(RigBuilder::new()).await;
    rig.rotation.set_capture_angle(180.0);

    let id = rig.session.capture_photo().await.unwrap();
    rig.wait_for(|e| matches!(e, SessionEvent::CaptureSaved { .. }))
        .await;
    rig.wait_idle().await;

    let photo =
        std::fs::read_to_string(rig.library_dir().join(format!("{id}.heic"))).unwrap();
    assert!(photo.contains("rotation=180"));
}

#[tokio::test]
async fn test_shutdown_releases_in_flight_captures() {
    let mut rig = running(RigBuilder::new().settings(live())).await;
    rig.control.set_latency(Duration::from_millis(100));

    let id = rig.session.capture_photo().await.unwrap();
    rig.wait_for(|e| matches!(e, SessionEvent::CaptureWillBegin { .. }))
        .await;
    assert_eq!(rig.session.snapshot().await.unwrap().in_flight_requests, 1);

    let temp = rig.temp_dir();
    rig.session.shutdown().await.unwrap();

    // Let the platform side play out; nothing is recorded or saved
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(files_with_extension(&temp, "mov").is_empty());
    assert!(!rig.library_dir().join(format!("{id}.heic")).exists());
}
