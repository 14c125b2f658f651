//! Synthetic camera backend for `stub://` endpoints.
//!
//! Produces deterministic frames with occasional scene changes so the stub
//! detector has something to track. The URL host selects failure behavior,
//! which lets tests exercise every start path without hardware:
//!
//! - `stub://denied`       open fails with PermissionDenied
//! - `stub://unavailable`  open fails with DeviceUnavailable
//! - `stub://flaky-torch`  torch application always fails
//! - anything else         opens normally
//!
//! Torch support is declared by the endpoint's `torch` flag.

use async_trait::async_trait;

use crate::capture::{CameraBackend, CameraEndpoint};
use crate::error::CaptureError;
use crate::frame::{rgb_byte_len, VideoFrame};

const SCENE_CHANGE_PERIOD: u64 = 50;

pub struct SyntheticCamera {
    endpoint: CameraEndpoint,
    open: bool,
    frame_count: u64,
    scene_state: u8,
    torch_on: bool,
}

impl SyntheticCamera {
    pub fn new(endpoint: CameraEndpoint) -> Self {
        Self {
            endpoint,
            open: false,
            frame_count: 0,
            scene_state: 0,
            torch_on: false,
        }
    }

    fn host(&self) -> &str {
        self.endpoint
            .url
            .strip_prefix("stub://")
            .unwrap_or("")
            .split('/')
            .next()
            .unwrap_or("")
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = rgb_byte_len(self.endpoint.width, self.endpoint.height);

        // Change the scene occasionally to simulate motion.
        if self.frame_count % SCENE_CHANGE_PERIOD == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        let brightness = if self.torch_on { 64 } else { 0 };
        for (i, pixel) in pixels.iter_mut().enumerate() {
            let value = (i as u64 + self.frame_count + self.scene_state as u64) % 256;
            *pixel = (value as u8).saturating_add(brightness);
        }
        pixels
    }
}

#[async_trait]
impl CameraBackend for SyntheticCamera {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn open(&mut self) -> Result<(), CaptureError> {
        match self.host() {
            "denied" => Err(CaptureError::PermissionDenied(
                "synthetic camera configured to deny access".to_string(),
            )),
            "unavailable" => Err(CaptureError::DeviceUnavailable(
                "synthetic camera configured as absent".to_string(),
            )),
            _ => {
                self.open = true;
                log::info!("synthetic camera {} connected", self.endpoint.url);
                Ok(())
            }
        }
    }

    async fn sample_frame(&mut self) -> Result<VideoFrame, CaptureError> {
        if !self.open {
            return Err(CaptureError::SessionClosed);
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(VideoFrame::new(
            pixels,
            self.endpoint.width,
            self.endpoint.height,
            0,
        ))
    }

    fn torch_supported(&self) -> bool {
        // flaky-torch still advertises support so the rejected-constraint
        // path is reachable.
        self.endpoint.torch
    }

    async fn set_torch(&mut self, on: bool) -> Result<(), CaptureError> {
        if !self.endpoint.torch {
            return Err(CaptureError::TorchUnsupported);
        }
        if self.host() == "flaky-torch" {
            return Err(CaptureError::TorchControlFailed(
                "synthetic torch configured to reject constraints".to_string(),
            ));
        }
        self.torch_on = on;
        Ok(())
    }

    async fn close(&mut self) {
        self.open = false;
        self.torch_on = false;
        log::debug!(
            "synthetic camera {} released after {} frames",
            self.endpoint.url,
            self.frame_count
        );
    }
}
