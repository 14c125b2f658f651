//! Camera capture sessions.
//!
//! A `CaptureSession` owns the active camera stream for its whole lifetime:
//! it is the only component that opens, samples, and releases the device, and
//! the only writer of `CaptureState`. Backends are scheme-dispatched from the
//! endpoint URL:
//!
//! - `stub://` synthetic frames (tests, demo)
//! - `http(s)://` MJPEG/JPEG network cameras (feature: camera-http)
//! - `v4l2://` local V4L2 devices (feature: camera-v4l2)
//!
//! Network endpoints must be a secure origin (https, or http to a loopback
//! host); this is checked before any device request.

mod synthetic;

#[cfg(feature = "camera-http")]
mod http;
#[cfg(feature = "camera-v4l2")]
mod v4l2;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{watch, Mutex};
use url::Url;

use crate::error::CaptureError;
use crate::frame::VideoFrame;

pub use synthetic::SyntheticCamera;

#[cfg(feature = "camera-http")]
pub use http::HttpCamera;
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Camera;

/// Lifecycle phase of the capture session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureState {
    #[default]
    Off,
    Starting,
    On,
    Stopping,
}

/// Camera orientation preference, mirroring the facing-mode constraint of
/// browser capture APIs.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Outward-facing (rear) camera.
    Environment,
    /// Inward-facing (front) camera.
    User,
}

/// One configured camera device.
#[derive(Clone, Debug)]
pub struct CameraEndpoint {
    pub url: String,
    pub facing: Option<Facing>,
    pub width: u32,
    pub height: u32,
    /// Whether the device advertises a controllable torch/lamp.
    pub torch: bool,
}

/// Device backend: opens a stream, samples frames, applies torch constraints.
///
/// Implementations must not retain sampled frames and must release the device
/// in `close`.
#[async_trait]
pub trait CameraBackend: Send {
    fn name(&self) -> &'static str;

    async fn open(&mut self) -> Result<(), CaptureError>;

    /// Capture the next frame. Valid only between `open` and `close`.
    async fn sample_frame(&mut self) -> Result<VideoFrame, CaptureError>;

    /// Capability probe; valid once the stream exists. `false` also covers
    /// platforms that report no capability information at all.
    fn torch_supported(&self) -> bool;

    async fn set_torch(&mut self, on: bool) -> Result<(), CaptureError>;

    async fn close(&mut self);
}

/// Reject network endpoints served from an insecure origin.
///
/// Local schemes (`stub`, `v4l2`, `file`) and https always pass; plain http
/// passes only for loopback hosts.
pub fn check_secure_context(endpoint_url: &str) -> Result<(), CaptureError> {
    let url = Url::parse(endpoint_url)
        .map_err(|e| CaptureError::DeviceUnavailable(format!("invalid camera url: {}", e)))?;
    match url.scheme() {
        "stub" | "v4l2" | "file" | "https" => Ok(()),
        "http" => {
            let host = url.host_str().unwrap_or("");
            if host == "localhost" || host == "127.0.0.1" || host == "[::1]" || host == "::1" {
                Ok(())
            } else {
                Err(CaptureError::NotSecureContext(endpoint_url.to_string()))
            }
        }
        _ => Ok(()),
    }
}

fn backend_for(endpoint: &CameraEndpoint) -> Result<Box<dyn CameraBackend>, CaptureError> {
    let url = Url::parse(&endpoint.url)
        .map_err(|e| CaptureError::DeviceUnavailable(format!("invalid camera url: {}", e)))?;
    match url.scheme() {
        "stub" => Ok(Box::new(SyntheticCamera::new(endpoint.clone()))),
        #[cfg(feature = "camera-http")]
        "http" | "https" => Ok(Box::new(HttpCamera::new(endpoint.clone()))),
        #[cfg(not(feature = "camera-http"))]
        "http" | "https" => Err(CaptureError::DeviceUnavailable(
            "built without camera-http support".to_string(),
        )),
        #[cfg(feature = "camera-v4l2")]
        "v4l2" => Ok(Box::new(V4l2Camera::new(endpoint.clone())?)),
        #[cfg(not(feature = "camera-v4l2"))]
        "v4l2" => Err(CaptureError::DeviceUnavailable(
            "built without camera-v4l2 support".to_string(),
        )),
        other => Err(CaptureError::DeviceUnavailable(format!(
            "unsupported camera scheme '{}'",
            other
        ))),
    }
}

struct ActiveStream {
    backend: Box<dyn CameraBackend>,
    torch_supported: bool,
    torch_on: bool,
}

struct Inner {
    active: Option<ActiveStream>,
    frame_seq: u64,
}

/// Owns the camera stream handle and serializes lifecycle transitions.
pub struct CaptureSession {
    devices: Vec<CameraEndpoint>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<CaptureState>,
}

impl CaptureSession {
    pub fn new(devices: Vec<CameraEndpoint>) -> Self {
        let (state_tx, _) = watch::channel(CaptureState::Off);
        Self {
            devices,
            inner: Mutex::new(Inner {
                active: None,
                frame_seq: 0,
            }),
            state_tx,
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions (UI reflection, detection loop exit).
    pub fn watch_state(&self) -> watch::Receiver<CaptureState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: CaptureState) {
        self.state_tx.send_replace(state);
    }

    /// Acquire a stream, preferring cameras that match `preferred`.
    ///
    /// Endpoints matching the preference are tried first; on
    /// `DeviceUnavailable` the constraint is relaxed and the remaining
    /// cameras are tried before reporting final failure. Permission and
    /// secure-context failures abort immediately. A start while the session
    /// is not Off is a no-op.
    pub async fn start(&self, preferred: Option<Facing>) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        if self.state() != CaptureState::Off {
            log::debug!("capture start ignored: session is {:?}", self.state());
            return Ok(());
        }
        self.set_state(CaptureState::Starting);

        match self.acquire(preferred).await {
            Ok(active) => {
                log::info!(
                    "capture started via {} (torch supported: {})",
                    active.backend.name(),
                    active.torch_supported
                );
                inner.active = Some(active);
                inner.frame_seq = 0;
                self.set_state(CaptureState::On);
                Ok(())
            }
            Err(e) => {
                self.set_state(CaptureState::Off);
                Err(e)
            }
        }
    }

    async fn acquire(&self, preferred: Option<Facing>) -> Result<ActiveStream, CaptureError> {
        if self.devices.is_empty() {
            return Err(CaptureError::DeviceUnavailable(
                "no cameras configured".to_string(),
            ));
        }

        // Preferred-facing endpoints first, then the rest (relaxed retry).
        let mut candidates: Vec<&CameraEndpoint> = Vec::with_capacity(self.devices.len());
        if let Some(facing) = preferred {
            candidates.extend(self.devices.iter().filter(|d| d.facing == Some(facing)));
        }
        let rest: Vec<&CameraEndpoint> = self
            .devices
            .iter()
            .filter(|d| !candidates.iter().any(|c| std::ptr::eq(*c, *d)))
            .collect();
        candidates.extend(rest);

        let mut last_err = CaptureError::DeviceUnavailable("no matching camera".to_string());
        for endpoint in candidates {
            check_secure_context(&endpoint.url)?;
            let mut backend = backend_for(endpoint)?;
            match backend.open().await {
                Ok(()) => {
                    let torch_supported = backend.torch_supported();
                    return Ok(ActiveStream {
                        backend,
                        torch_supported,
                        torch_on: false,
                    });
                }
                Err(e @ CaptureError::PermissionDenied(_)) => return Err(e),
                Err(e) => {
                    log::warn!("camera {} failed to open: {}", endpoint.url, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Release the stream. Idempotent; a stop while Off is a no-op. If the
    /// torch is on it is turned off before the tracks are released
    /// (best-effort; failures are logged, not surfaced).
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if self.state() == CaptureState::Off {
            return;
        }
        self.set_state(CaptureState::Stopping);
        if let Some(mut active) = inner.active.take() {
            if active.torch_on {
                if let Err(e) = active.backend.set_torch(false).await {
                    log::warn!("failed to turn torch off during stop: {}", e);
                }
            }
            active.backend.close().await;
        }
        self.set_state(CaptureState::Off);
        log::info!("capture stopped");
    }

    /// Torch capability of the active stream. `false` when no stream exists
    /// or the platform reports no capability information.
    pub async fn probe_torch_capability(&self) -> bool {
        let inner = self.inner.lock().await;
        inner
            .active
            .as_ref()
            .is_some_and(|active| active.torch_supported)
    }

    /// Apply the torch constraint to the active track.
    pub async fn set_torch(&self, on: bool) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        let active = inner
            .active
            .as_mut()
            .ok_or(CaptureError::TorchUnsupported)?;
        if !active.torch_supported {
            return Err(CaptureError::TorchUnsupported);
        }
        active.backend.set_torch(on).await?;
        active.torch_on = on;
        Ok(())
    }

    /// Whether the torch is currently applied.
    pub async fn torch_on(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.active.as_ref().is_some_and(|active| active.torch_on)
    }

    /// Sample the current frame. The caller owns the frame for one
    /// detect+draw cycle only.
    pub async fn sample_frame(&self) -> Result<VideoFrame, CaptureError> {
        let mut inner = self.inner.lock().await;
        if self.state() != CaptureState::On {
            return Err(CaptureError::SessionClosed);
        }
        let seq = inner.frame_seq + 1;
        let active = inner.active.as_mut().ok_or(CaptureError::SessionClosed)?;
        let mut frame = active.backend.sample_frame().await?;
        frame.seq = seq;
        inner.frame_seq = seq;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(url: &str, facing: Option<Facing>, torch: bool) -> CameraEndpoint {
        CameraEndpoint {
            url: url.to_string(),
            facing,
            width: 64,
            height: 48,
            torch,
        }
    }

    #[test]
    fn secure_context_rules() {
        assert!(check_secure_context("stub://front").is_ok());
        assert!(check_secure_context("https://cam.example/stream").is_ok());
        assert!(check_secure_context("http://127.0.0.1:81/stream").is_ok());
        assert!(check_secure_context("http://localhost/stream").is_ok());
        assert!(matches!(
            check_secure_context("http://cam.example/stream"),
            Err(CaptureError::NotSecureContext(_))
        ));
    }

    #[tokio::test]
    async fn start_reaches_on_and_samples_frames() {
        let session = CaptureSession::new(vec![endpoint("stub://front", None, false)]);
        session.start(Some(Facing::Environment)).await.unwrap();
        assert_eq!(session.state(), CaptureState::On);

        let f1 = session.sample_frame().await.unwrap();
        let f2 = session.sample_frame().await.unwrap();
        assert_eq!(f1.width, 64);
        assert_eq!(f1.seq, 1);
        assert_eq!(f2.seq, 2);

        session.stop().await;
        assert_eq!(session.state(), CaptureState::Off);
    }

    #[tokio::test]
    async fn start_is_noop_when_already_on() {
        let session = CaptureSession::new(vec![endpoint("stub://front", None, false)]);
        session.start(None).await.unwrap();
        session.sample_frame().await.unwrap();
        // Second start must not reset the stream.
        session.start(None).await.unwrap();
        let frame = session.sample_frame().await.unwrap();
        assert_eq!(frame.seq, 2);
        session.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let session = CaptureSession::new(vec![endpoint("stub://front", None, true)]);
        session.start(None).await.unwrap();
        session.set_torch(true).await.unwrap();
        session.stop().await;
        session.stop().await;
        assert_eq!(session.state(), CaptureState::Off);
        assert!(!session.torch_on().await);
    }

    #[tokio::test]
    async fn failed_start_returns_to_off() {
        let session = CaptureSession::new(vec![endpoint("stub://unavailable", None, false)]);
        let err = session.start(None).await.unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert_eq!(session.state(), CaptureState::Off);
        assert!(matches!(
            session.sample_frame().await,
            Err(CaptureError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn permission_denied_aborts_without_relaxed_retry() {
        let session = CaptureSession::new(vec![
            endpoint("stub://denied", Some(Facing::Environment), false),
            endpoint("stub://front", Some(Facing::User), false),
        ]);
        let err = session.start(Some(Facing::Environment)).await.unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied(_)));
        assert_eq!(session.state(), CaptureState::Off);
    }

    #[tokio::test]
    async fn device_unavailable_retries_relaxed() {
        let session = CaptureSession::new(vec![
            endpoint("stub://unavailable", Some(Facing::Environment), false),
            endpoint("stub://front", Some(Facing::User), false),
        ]);
        session.start(Some(Facing::Environment)).await.unwrap();
        assert_eq!(session.state(), CaptureState::On);
        session.stop().await;
    }

    #[tokio::test]
    async fn insecure_endpoint_fails_before_open() {
        let session =
            CaptureSession::new(vec![endpoint("http://cam.example/stream", None, false)]);
        let err = session.start(None).await.unwrap_err();
        assert!(matches!(err, CaptureError::NotSecureContext(_)));
        assert_eq!(session.state(), CaptureState::Off);
    }

    #[tokio::test]
    async fn torch_probe_and_apply() {
        let session = CaptureSession::new(vec![endpoint("stub://front", None, true)]);
        assert!(!session.probe_torch_capability().await);
        session.start(None).await.unwrap();
        assert!(session.probe_torch_capability().await);
        session.set_torch(true).await.unwrap();
        assert!(session.torch_on().await);
        session.set_torch(false).await.unwrap();
        assert!(!session.torch_on().await);
        session.stop().await;
    }

    #[tokio::test]
    async fn torch_unsupported_is_typed() {
        let session = CaptureSession::new(vec![endpoint("stub://front", None, false)]);
        session.start(None).await.unwrap();
        assert!(matches!(
            session.set_torch(true).await,
            Err(CaptureError::TorchUnsupported)
        ));
        session.stop().await;
    }
}
