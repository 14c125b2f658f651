//! Annocam — live annotated camera preview.
//!
//! This crate runs a looped capture → detect → draw pipeline over a camera
//! stream: frames are sampled from an exclusive capture session, passed
//! through an object detector, filtered by the active display mode, and
//! rendered as labeled bounding boxes onto a shared preview surface.
//!
//! # Architecture
//!
//! - `capture`: camera ownership. One `CaptureSession` holds the device,
//!   serializes start/stop, and owns torch control. Backends (synthetic,
//!   HTTP, V4L2) sit behind the `CameraBackend` trait.
//! - `detect`: the `Detector` trait plus backends (scripted stub, and an
//!   ONNX backend behind the `backend-tract` feature).
//! - `mode` / `render`: display-mode filtering and overlay drawing.
//! - `detection_loop`: the paced cycle task, bound to the capture lifetime.
//! - `snapshot`: on-demand annotated PNG stills.
//! - `controller`: the single command surface. Camera toggle, flash toggle,
//!   mode switch, and snapshot all go through `LifecycleController`, which
//!   applies them one at a time in issue order.

pub mod capture;
pub mod config;
pub mod controller;
pub mod detect;
pub mod detection_loop;
pub mod error;
pub mod frame;
pub mod mode;
pub mod render;
pub mod snapshot;
pub mod ui;

pub use capture::{CameraBackend, CameraEndpoint, CaptureSession, CaptureState, Facing};
pub use config::AnnocamConfig;
pub use controller::{ControllerStatus, FlashState, LifecycleController};
pub use detect::{BoundingBox, Detection, Detector, StubDetector};
#[cfg(feature = "backend-tract")]
pub use detect::TractDetector;
pub use detection_loop::DetectionLoop;
pub use error::{CaptureError, CommandError, DetectorError, SnapshotError};
pub use frame::{FrameSurface, VideoFrame};
pub use mode::{AnimalClassSet, DisplayMode, DEFAULT_ANIMAL_CLASSES};
pub use render::OverlayRenderer;
pub use snapshot::{Snapshot, SnapshotCapture};
