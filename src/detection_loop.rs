//! The repeating detect → filter → render cycle.
//!
//! The loop is an explicit cancellable task bound to the capture lifetime:
//! it runs only while the session reports `On`, and every exit path
//! (cancellation, capture stop, detector errors) leaves it joinable. Pacing
//! is a fixed minimum interval; the cycle body runs inline in the task, so
//! the next detection is never dispatched before the prior render completes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::capture::{CaptureSession, CaptureState};
use crate::detect::Detector;
use crate::frame::FrameSurface;
use crate::mode::{self, AnimalClassSet, DisplayMode};
use crate::render::OverlayRenderer;

struct LoopHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

pub struct DetectionLoop {
    session: Arc<CaptureSession>,
    detector: Arc<Mutex<Box<dyn Detector>>>,
    surface: Arc<Mutex<FrameSurface>>,
    renderer: OverlayRenderer,
    animals: Arc<AnimalClassSet>,
    mode_rx: watch::Receiver<DisplayMode>,
    interval: Duration,
    cycles: Arc<AtomicU64>,
    handle: std::sync::Mutex<Option<LoopHandle>>,
}

impl DetectionLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<CaptureSession>,
        detector: Arc<Mutex<Box<dyn Detector>>>,
        surface: Arc<Mutex<FrameSurface>>,
        renderer: OverlayRenderer,
        animals: Arc<AnimalClassSet>,
        mode_rx: watch::Receiver<DisplayMode>,
        interval: Duration,
    ) -> Self {
        Self {
            session,
            detector,
            surface,
            renderer,
            animals,
            mode_rx,
            interval,
            cycles: Arc::new(AtomicU64::new(0)),
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Begin scheduling cycles. No-op if the loop is already running.
    pub fn start(&self) {
        let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|h| !h.join.is_finished()) {
            log::debug!("detection loop already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run_loop(LoopContext {
            session: self.session.clone(),
            detector: self.detector.clone(),
            surface: self.surface.clone(),
            renderer: self.renderer.clone(),
            animals: self.animals.clone(),
            mode_rx: self.mode_rx.clone(),
            interval: self.interval,
            cycles: self.cycles.clone(),
            shutdown_rx,
        }));
        *slot = Some(LoopHandle { shutdown_tx, join });
        log::info!(
            "detection loop started (interval {} ms)",
            self.interval.as_millis()
        );
    }

    /// Cancel the next scheduled cycle and wait for the task to exit. An
    /// in-flight cycle is allowed to finish; its result is discarded by the
    /// capture-state re-check before render.
    pub async fn stop(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };
        let _ = handle.shutdown_tx.send(true);
        if handle.join.await.is_err() {
            log::warn!("detection loop task panicked during shutdown");
        }
        log::info!(
            "detection loop stopped after {} cycles",
            self.cycles.load(Ordering::Relaxed)
        );
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.join.is_finished())
    }

    /// Completed detect+draw cycles since construction.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

struct LoopContext {
    session: Arc<CaptureSession>,
    detector: Arc<Mutex<Box<dyn Detector>>>,
    surface: Arc<Mutex<FrameSurface>>,
    renderer: OverlayRenderer,
    animals: Arc<AnimalClassSet>,
    mode_rx: watch::Receiver<DisplayMode>,
    interval: Duration,
    cycles: Arc<AtomicU64>,
    shutdown_rx: watch::Receiver<bool>,
}

async fn run_loop(mut ctx: LoopContext) {
    let mut ticker = tokio::time::interval(ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.shutdown_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        // Dispatch-time check: never invoke the detector once capture left On.
        if ctx.session.state() != CaptureState::On {
            break;
        }

        // The frame sampled here is the one the drawn boxes describe; frame
        // and detections travel together for the rest of the cycle.
        let frame = match ctx.session.sample_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("frame sample failed: {}", e);
                continue;
            }
        };

        let detections = {
            let mut detector = ctx.detector.lock().await;
            match detector.detect(&frame).await {
                Ok(detections) => detections,
                Err(e) => {
                    // Non-fatal: retry on the next scheduled tick.
                    log::warn!("detector failure (cycle skipped): {}", e);
                    continue;
                }
            }
        };

        // Render-time re-check: a detection dispatched before a stop may
        // resolve after it; the result is discarded, not rendered.
        if ctx.session.state() != CaptureState::On {
            log::debug!("discarding detection pass for frame {}", frame.seq);
            break;
        }

        let mode = *ctx.mode_rx.borrow();
        let visible = mode::filter(detections, mode, &ctx.animals);

        let mut surface = ctx.surface.lock().await;
        ctx.renderer.draw(&mut surface, &frame, &visible);
        drop(surface);

        ctx.cycles.fetch_add(1, Ordering::Relaxed);
    }
}
