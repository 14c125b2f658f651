//! The lifecycle controller: one owner for camera, flash, mode, and loop.
//!
//! Every externally visible state transition flows through here, one command
//! at a time. The controller never renders or detects itself; it wires the
//! capture session, detection loop, and snapshot path together and keeps the
//! flash and display-mode state that the other components read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::capture::{CaptureSession, CaptureState, Facing};
use crate::config::AnnocamConfig;
use crate::detect::Detector;
use crate::detection_loop::DetectionLoop;
use crate::error::{CaptureError, CommandError, DetectorError, SnapshotError};
use crate::frame::FrameSurface;
use crate::mode::{AnimalClassSet, DisplayMode};
use crate::render::OverlayRenderer;
use crate::snapshot::{Snapshot, SnapshotCapture};

/// Torch availability and state for the active session.
///
/// `Unsupported` outside an active session and whenever control is lost; the
/// supported/unsupported question is re-answered by probing each time a
/// camera starts, since a facing fallback can land on different hardware.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlashState {
    #[default]
    Unsupported,
    Off,
    On,
}

impl FlashState {
    pub fn label(self) -> &'static str {
        match self {
            FlashState::Unsupported => "unsupported",
            FlashState::Off => "off",
            FlashState::On => "on",
        }
    }
}

/// A point-in-time view of the controller, for status lines and tests.
#[derive(Clone, Debug)]
pub struct ControllerStatus {
    pub capture: CaptureState,
    pub flash: FlashState,
    pub mode: DisplayMode,
    pub message: String,
}

pub struct LifecycleController {
    session: Arc<CaptureSession>,
    surface: Arc<Mutex<FrameSurface>>,
    detector: Arc<Mutex<Box<dyn Detector>>>,
    detector_ready: AtomicBool,
    detection_loop: DetectionLoop,
    snapshots: SnapshotCapture,
    mode_tx: watch::Sender<DisplayMode>,
    flash: std::sync::Mutex<FlashState>,
    message: std::sync::Mutex<String>,
    preferred_facing: Option<Facing>,
    // Commands mutate several pieces of state together; this keeps them
    // applied whole, in issue order.
    command_gate: Mutex<()>,
}

impl LifecycleController {
    pub fn new(config: &AnnocamConfig, detector: Box<dyn Detector>) -> Self {
        let animals = Arc::new(AnimalClassSet::new(
            config.detection.animal_classes.iter().cloned(),
        ));
        let renderer = OverlayRenderer::new(animals.clone());
        let session = Arc::new(CaptureSession::new(config.cameras.clone()));
        let surface = Arc::new(Mutex::new(FrameSurface::new()));
        let detector: Arc<Mutex<Box<dyn Detector>>> = Arc::new(Mutex::new(detector));
        let (mode_tx, _) = watch::channel(DisplayMode::All);

        let detection_loop = DetectionLoop::new(
            session.clone(),
            detector.clone(),
            surface.clone(),
            renderer.clone(),
            animals.clone(),
            mode_tx.subscribe(),
            config.detection.interval,
        );
        let snapshots = SnapshotCapture::new(
            session.clone(),
            detector.clone(),
            surface.clone(),
            renderer,
            animals,
            mode_tx.subscribe(),
            config.snapshot.prefix.clone(),
        );

        Self {
            session,
            surface,
            detector,
            detector_ready: AtomicBool::new(false),
            detection_loop,
            snapshots,
            mode_tx,
            flash: std::sync::Mutex::new(FlashState::Unsupported),
            message: std::sync::Mutex::new("camera off".to_string()),
            preferred_facing: Some(Facing::Environment),
            command_gate: Mutex::new(()),
        }
    }

    /// Load the detector model. Until this succeeds the camera toggle is
    /// refused; it may be retried after a failure.
    pub async fn warm_up_detector(&self) -> Result<(), DetectorError> {
        let mut detector = self.detector.lock().await;
        match detector.warm_up().await {
            Ok(()) => {
                self.detector_ready.store(true, Ordering::Release);
                log::info!("detector '{}' ready", detector.name());
                Ok(())
            }
            Err(e) => {
                self.detector_ready.store(false, Ordering::Release);
                self.set_message(format!("detector failed to load: {}", e));
                Err(e)
            }
        }
    }

    /// Start the camera if it is off, stop it if it is on.
    ///
    /// Returns the settled state. A start failure leaves the session `Off`
    /// and surfaces the acquisition error; a stop cannot fail.
    pub async fn toggle_camera(&self) -> Result<CaptureState, CommandError> {
        let _command = self.command_gate.lock().await;

        match self.session.state() {
            CaptureState::On => {
                self.set_message("stopping camera");
                // Loop first, so no cycle dispatches against a closing stream.
                self.detection_loop.stop().await;
                self.session.stop().await;
                self.surface.lock().await.clear();
                self.set_flash(FlashState::Unsupported);
                self.set_message("camera off");
                Ok(CaptureState::Off)
            }
            CaptureState::Off => {
                if !self.detector_ready.load(Ordering::Acquire) {
                    self.set_message("camera unavailable: detector not loaded");
                    return Err(CommandError::Detector(DetectorError::Init(
                        "no detector loaded".to_string(),
                    )));
                }
                self.set_message("starting camera");
                if let Err(e) = self.session.start(self.preferred_facing).await {
                    self.set_message(format!("camera start failed: {}", e));
                    return Err(CommandError::Capture(e));
                }
                let torch = self.session.probe_torch_capability().await;
                self.set_flash(if torch {
                    FlashState::Off
                } else {
                    FlashState::Unsupported
                });
                self.detection_loop.start();
                self.set_message("camera on");
                Ok(CaptureState::On)
            }
            // A transition is already in flight under the gate; report it.
            other => Ok(other),
        }
    }

    /// Flip the torch. Only valid while the camera is on and the active
    /// stream advertised torch support at start.
    pub async fn toggle_flash(&self) -> Result<FlashState, CommandError> {
        let _command = self.command_gate.lock().await;

        if self.session.state() != CaptureState::On {
            return Err(CommandError::Capture(CaptureError::TorchUnsupported));
        }
        let target = match self.flash_state() {
            FlashState::Unsupported => {
                return Err(CommandError::Capture(CaptureError::TorchUnsupported))
            }
            FlashState::Off => true,
            FlashState::On => false,
        };

        match self.session.set_torch(target).await {
            Ok(()) => {
                let next = if target { FlashState::On } else { FlashState::Off };
                self.set_flash(next);
                self.set_message(format!("flash {}", next.label()));
                Ok(next)
            }
            Err(e) => {
                // The device rejected the constraint: the torch stays dark
                // and the control is withdrawn for the rest of the session.
                log::warn!("torch control failed, disabling for this session: {}", e);
                self.set_flash(FlashState::Unsupported);
                self.set_message("flash unavailable");
                Err(CommandError::Capture(e))
            }
        }
    }

    /// Set the display mode. Takes effect from the next render, both for the
    /// loop and for snapshots.
    pub fn set_mode(&self, mode: DisplayMode) -> DisplayMode {
        self.mode_tx.send_replace(mode);
        self.set_message(format!("showing {}", mode.label()));
        mode
    }

    pub fn toggle_mode(&self) -> DisplayMode {
        let next = self.mode().toggled();
        self.set_mode(next)
    }

    /// Capture one annotated still.
    pub async fn snapshot(&self) -> Result<Snapshot, SnapshotError> {
        self.snapshots.capture().await
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            capture: self.session.state(),
            flash: self.flash_state(),
            mode: self.mode(),
            message: self
                .message
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }

    pub fn capture_state(&self) -> CaptureState {
        self.session.state()
    }

    pub fn watch_capture_state(&self) -> watch::Receiver<CaptureState> {
        self.session.watch_state()
    }

    pub fn flash_state(&self) -> FlashState {
        *self.flash.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mode(&self) -> DisplayMode {
        *self.mode_tx.borrow()
    }

    pub fn watch_mode(&self) -> watch::Receiver<DisplayMode> {
        self.mode_tx.subscribe()
    }

    pub fn loop_running(&self) -> bool {
        self.detection_loop.is_running()
    }

    /// Completed detect+draw cycles, for health reporting.
    pub fn loop_cycles(&self) -> u64 {
        self.detection_loop.cycles()
    }

    /// Mutation count of the shared render surface, for tests asserting that
    /// an operation did or did not draw.
    pub async fn surface_generation(&self) -> u64 {
        self.surface.lock().await.generation()
    }

    fn set_flash(&self, state: FlashState) {
        *self.flash.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        log::debug!("status: {}", message);
        *self.message.lock().unwrap_or_else(|e| e.into_inner()) = message;
    }
}
