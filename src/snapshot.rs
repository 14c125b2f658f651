//! On-demand annotated stills.
//!
//! A snapshot is not a copy of the last rendered surface: it samples a fresh
//! frame, runs its own detection pass, and draws the overlays for that exact
//! frame, so the saved boxes always match the saved pixels. Requests are
//! serialized; concurrent callers queue rather than race the detector.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};

use crate::capture::{CaptureSession, CaptureState};
use crate::detect::Detector;
use crate::error::{CaptureError, SnapshotError};
use crate::frame::FrameSurface;
use crate::mode::{self, AnimalClassSet, DisplayMode};
use crate::render::OverlayRenderer;

/// A finished capture: PNG bytes plus the suggested download name.
#[derive(Debug)]
pub struct Snapshot {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub struct SnapshotCapture {
    session: Arc<CaptureSession>,
    detector: Arc<Mutex<Box<dyn Detector>>>,
    surface: Arc<Mutex<FrameSurface>>,
    renderer: OverlayRenderer,
    animals: Arc<AnimalClassSet>,
    mode_rx: watch::Receiver<DisplayMode>,
    prefix: String,
    gate: Mutex<()>,
}

impl SnapshotCapture {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<CaptureSession>,
        detector: Arc<Mutex<Box<dyn Detector>>>,
        surface: Arc<Mutex<FrameSurface>>,
        renderer: OverlayRenderer,
        animals: Arc<AnimalClassSet>,
        mode_rx: watch::Receiver<DisplayMode>,
        prefix: String,
    ) -> Self {
        Self {
            session,
            detector,
            surface,
            renderer,
            animals,
            mode_rx,
            prefix,
            gate: Mutex::new(()),
        }
    }

    /// Capture one annotated still at the current display mode.
    ///
    /// Fails with `CameraNotActive` unless the session is `On`, checked
    /// before sampling and again once the surface lock is held, so a stop
    /// that lands mid-capture never redraws over a cleared preview.
    pub async fn capture(&self) -> Result<Snapshot, SnapshotError> {
        let _serialized = self.gate.lock().await;

        if self.session.state() != CaptureState::On {
            return Err(SnapshotError::CameraNotActive);
        }

        let frame = self.session.sample_frame().await.map_err(|e| match e {
            CaptureError::SessionClosed => SnapshotError::CameraNotActive,
            other => SnapshotError::Capture(other),
        })?;

        let detections = {
            let mut detector = self.detector.lock().await;
            detector.detect(&frame).await?
        };

        let mode = *self.mode_rx.borrow();
        let visible = mode::filter(detections, mode, &self.animals);

        let bytes = {
            let mut surface = self.surface.lock().await;
            // Re-checked under the lock: a concurrent stop may have cleared
            // the surface while we waited for it.
            if self.session.state() != CaptureState::On {
                return Err(SnapshotError::CameraNotActive);
            }
            self.renderer.draw(&mut surface, &frame, &visible);
            surface.encode_png()?
        };

        let filename = format!(
            "{}-{}.png",
            self.prefix,
            // Colons are invalid in filenames on common targets, so the
            // timestamp uses dashes within the time component too.
            Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ")
        );
        log::info!(
            "snapshot {} ({} bytes, {} boxes, {})",
            filename,
            bytes.len(),
            visible.len(),
            mode.label()
        );
        Ok(Snapshot { filename, bytes })
    }
}
