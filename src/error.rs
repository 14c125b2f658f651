//! Error types for the annotation kernel.

use thiserror::Error;

/// Errors raised while acquiring or controlling a camera stream.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The endpoint is a network camera served over an insecure origin.
    /// Checked before any device request is issued.
    #[error("capture requires a secure origin (https or loopback host): {0}")]
    NotSecureContext(String),

    /// The device refused access.
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    /// No matching device, or the device failed to open.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// The active stream reports no torch capability.
    #[error("torch is not supported by the active camera")]
    TorchUnsupported,

    /// The torch constraint was rejected by the device.
    #[error("torch control failed: {0}")]
    TorchControlFailed(String),

    /// An operation that needs a live stream ran while the session was off.
    #[error("capture session is not active")]
    SessionClosed,
}

/// Errors raised by detector backends.
#[derive(Error, Debug)]
pub enum DetectorError {
    /// The model failed to load or warm up. Camera activation stays blocked
    /// until a detector loads successfully.
    #[error("detector initialization failed: {0}")]
    Init(String),

    /// A single inference pass failed. Non-fatal to the loop.
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Errors surfaced to callers of the lifecycle controller commands.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Detector(#[from] DetectorError),
}

/// Errors raised by snapshot capture.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Snapshot requested while the camera is off.
    #[error("camera is not active")]
    CameraNotActive,

    #[error("snapshot frame capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("snapshot detection pass failed: {0}")]
    Detector(#[from] DetectorError),

    #[error("snapshot encoding failed: {0}")]
    Encode(String),
}
