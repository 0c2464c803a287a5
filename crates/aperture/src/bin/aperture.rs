//! Aperture session driver
//!
//! Runs a capture session against the simulated platform and prints every
//! session event as a JSON line on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use aperture::simulated::{
    DirectoryLibrary, FixedLocation, SimulatedCaptureService, SimulatorControl, StaticPermissions,
};
use aperture::{
    AuthorizationStatus, FilePreferenceStore, InterruptionReason, LibraryAuthorization,
    PlatformSignal, ReadinessTracker, RotationTracker, SessionEvent, SessionHandle,
    SessionOptions, SessionParts,
};
use apertureconf::ApertureConfig;
use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Drive a simulated camera capture session", long_about = None)]
struct Cli {
    /// Config file to use instead of ./aperture.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of photos to capture
    #[arg(short = 'n', long, default_value = "1")]
    captures: u32,

    /// Capture Live Photos regardless of config
    #[arg(long)]
    live: bool,

    /// Deny camera access
    #[arg(long)]
    deny_camera: bool,

    /// Deny photo library access
    #[arg(long)]
    deny_library: bool,

    /// Interrupt the session after the first capture
    #[arg(long, value_enum)]
    interrupt: Option<InterruptArg>,

    /// Simulate a media services reset after the captures
    #[arg(long)]
    media_reset: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    show_config: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum InterruptArg {
    AudioInUse,
    VideoInUse,
    MultiAppUnavailable,
    SystemPressure,
    Unknown,
}

impl From<InterruptArg> for InterruptionReason {
    fn from(arg: InterruptArg) -> Self {
        match arg {
            InterruptArg::AudioInUse => InterruptionReason::AudioInUse,
            InterruptArg::VideoInUse => InterruptionReason::VideoInUse,
            InterruptArg::MultiAppUnavailable => InterruptionReason::MultiAppUnavailable,
            InterruptArg::SystemPressure => InterruptionReason::SystemPressure,
            InterruptArg::Unknown => InterruptionReason::Unknown,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ApertureConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    if cli.show_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.infra.telemetry.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("aperture {} starting", env!("CARGO_PKG_VERSION"));

    let paths = &config.infra.paths;
    std::fs::create_dir_all(&paths.state_dir).with_context(|| {
        format!("Failed to create state directory {}", paths.state_dir.display())
    })?;

    let control = SimulatorControl::new();
    let permissions = if cli.deny_camera {
        StaticPermissions::new(AuthorizationStatus::Denied, false)
    } else {
        StaticPermissions::authorized()
    };
    let library_status = if cli.deny_library {
        LibraryAuthorization::Denied
    } else {
        LibraryAuthorization::Authorized
    };

    let parts = SessionParts {
        service: Box::new(SimulatedCaptureService::new(control.clone())),
        permissions: Arc::new(permissions),
        prefs: Arc::new(FilePreferenceStore::new(paths.preferences_file())),
        library: Arc::new(DirectoryLibrary::new(&paths.library_dir, library_status)),
        rotation: Arc::new(RotationTracker::default()),
        location: Arc::new(FixedLocation(None)),
    };

    let mut options = SessionOptions::from_config(&config);
    if cli.live {
        options.base_settings.live_photo = true;
    }

    // UI-side shutter readiness
    let readiness = Arc::new(Mutex::new(ReadinessTracker::new(
        config.capture.max_in_flight as usize,
    )));

    let session = SessionHandle::spawn(parts, options);
    let printer = tokio::spawn(print_events(session.subscribe(), readiness.clone()));

    let result = drive(&session, &control, &readiness, &cli).await;

    session.shutdown().await.context("Session shutdown failed")?;
    drop(session);
    if let Err(e) = printer.await {
        warn!("Event printer failed: {}", e);
    }

    result?;
    info!("aperture finished");
    Ok(())
}

async fn drive(
    session: &SessionHandle,
    control: &SimulatorControl,
    readiness: &Mutex<ReadinessTracker>,
    cli: &Cli,
) -> Result<()> {
    session.configure().await.context("Session setup failed")?;
    session.start().await.context("Session failed to start")?;

    for n in 0..cli.captures {
        let token = lock(readiness).start_tracking();
        match session.capture_photo().await {
            Ok(id) => {
                info!("Submitted {}", id);
                lock(readiness).submitted(token, id);
            }
            Err(e) => {
                warn!("Capture {} not submitted: {}", n + 1, e);
                lock(readiness).stop_tracking(token);
            }
        }

        if n == 0 {
            if let Some(arg) = cli.interrupt {
                interrupt(session, arg.into()).await?;
            }
        }
    }

    wait_for_captures(session).await?;

    if cli.media_reset {
        let state = session.signal(control.media_services_reset()).await?;
        info!("After media services reset: {:?}", state);
    }
    Ok(())
}

async fn interrupt(session: &SessionHandle, reason: InterruptionReason) -> Result<()> {
    session
        .signal(PlatformSignal::InterruptionBegan(reason))
        .await?;

    if reason.resume_available() {
        if let Err(e) = session.resume().await {
            bail!("Session could not resume after {:?}: {}", reason, e);
        }
    } else {
        session.signal(PlatformSignal::InterruptionEnded).await?;
    }
    Ok(())
}

async fn wait_for_captures(session: &SessionHandle) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let snapshot = session.snapshot().await?;
        if snapshot.in_flight_requests == 0 {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!(
                "Timed out with {} captures in flight",
                snapshot.in_flight_requests
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn lock(readiness: &Mutex<ReadinessTracker>) -> std::sync::MutexGuard<'_, ReadinessTracker> {
    readiness.lock().unwrap_or_else(|e| e.into_inner())
}

async fn print_events(
    mut events: broadcast::Receiver<SessionEvent>,
    readiness: Arc<Mutex<ReadinessTracker>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                {
                    let mut tracker = lock(&readiness);
                    let before = tracker.readiness();
                    tracker.observe(&event);
                    let after = tracker.readiness();
                    if before != after {
                        debug!("Shutter {:?} ({:?})", tracker.shutter_state(), after);
                    }
                }
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to encode event: {}", e),
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => warn!("Dropped {} events", n),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
