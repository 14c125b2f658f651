#![cfg(feature = "camera-v4l2")]

//! V4L2 camera backend for `v4l2:///dev/videoN` endpoints.
//!
//! Dequeues mmap buffers directly; reads are local and short, so they run
//! inline rather than on the blocking pool. V4L2 exposes no torch control
//! here, so the capability probe always reports false.

use async_trait::async_trait;
use ouroboros::self_referencing;
use url::Url;

use crate::capture::{CameraBackend, CameraEndpoint};
use crate::error::CaptureError;
use crate::frame::{rgb_byte_len, VideoFrame};

const RGB3: &[u8; 4] = b"RGB3";

pub struct V4l2Camera {
    endpoint: CameraEndpoint,
    device_path: String,
    state: Option<V4l2State>,
    active_width: u32,
    active_height: u32,
    frame_count: u64,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn new(endpoint: CameraEndpoint) -> Result<Self, CaptureError> {
        let url = Url::parse(&endpoint.url)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("invalid camera url: {}", e)))?;
        let device_path = url.path().to_string();
        if device_path.is_empty() {
            return Err(CaptureError::DeviceUnavailable(
                "v4l2 url missing device path".to_string(),
            ));
        }
        Ok(Self {
            active_width: endpoint.width,
            active_height: endpoint.height,
            endpoint,
            device_path,
            state: None,
            frame_count: 0,
        })
    }
}

#[async_trait]
impl CameraBackend for V4l2Camera {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    async fn open(&mut self) -> Result<(), CaptureError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(&self.device_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                CaptureError::PermissionDenied(format!("{}: {}", self.device_path, e))
            } else {
                CaptureError::DeviceUnavailable(format!("open {}: {}", self.device_path, e))
            }
        })?;

        let mut format = device
            .format()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("read v4l2 format: {}", e)))?;
        format.width = self.endpoint.width;
        format.height = self.endpoint.height;
        format.fourcc = v4l::FourCC::new(RGB3);
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(e) => {
                log::warn!("failed to set format on {}: {}", self.device_path, e);
                device.format().map_err(|e| {
                    CaptureError::DeviceUnavailable(format!("read v4l2 format: {}", e))
                })?
            }
        };
        // Drivers may legally negotiate a different pixel format; everything
        // downstream assumes packed RGB8, so anything else is unusable.
        ensure_rgb3(&format.fourcc.repr, &self.device_path)?;
        self.active_width = format.width;
        self.active_height = format.height;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|e| CaptureError::DeviceUnavailable(format!("create v4l2 stream: {}", e)))?;
        self.state = Some(state);

        log::info!(
            "v4l2 camera {} connected ({}x{})",
            self.device_path,
            self.active_width,
            self.active_height
        );
        Ok(())
    }

    async fn sample_frame(&mut self) -> Result<VideoFrame, CaptureError> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().ok_or(CaptureError::SessionClosed)?;
        let (mut pixels, bytes_used) = state
            .with_mut(|fields| {
                fields
                    .stream
                    .next()
                    .map(|(buf, meta)| (buf.to_vec(), meta.bytesused as usize))
            })
            .map_err(|e| CaptureError::DeviceUnavailable(format!("capture v4l2 frame: {}", e)))?;

        // Mmap buffers can be larger than the payload; bytesused marks the
        // end of the frame the driver actually wrote.
        if bytes_used > 0 && bytes_used <= pixels.len() {
            pixels.truncate(bytes_used);
        }
        check_frame_len(pixels.len(), self.active_width, self.active_height)?;

        self.frame_count += 1;
        Ok(VideoFrame::new(
            pixels,
            self.active_width,
            self.active_height,
            0,
        ))
    }

    fn torch_supported(&self) -> bool {
        false
    }

    async fn set_torch(&mut self, _on: bool) -> Result<(), CaptureError> {
        Err(CaptureError::TorchUnsupported)
    }

    async fn close(&mut self) {
        self.state = None;
        log::debug!(
            "v4l2 camera {} released after {} frames",
            self.device_path,
            self.frame_count
        );
    }
}

fn ensure_rgb3(fourcc: &[u8; 4], device_path: &str) -> Result<(), CaptureError> {
    if fourcc == RGB3 {
        return Ok(());
    }
    Err(CaptureError::DeviceUnavailable(format!(
        "{} negotiated fourcc {} instead of RGB3",
        device_path,
        String::from_utf8_lossy(fourcc),
    )))
}

fn check_frame_len(len: usize, width: u32, height: u32) -> Result<(), CaptureError> {
    let expected = rgb_byte_len(width, height);
    if len == expected {
        return Ok(());
    }
    Err(CaptureError::DeviceUnavailable(format!(
        "v4l2 frame is {} bytes, expected {} for {}x{} RGB8",
        len, expected, width, height,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb3_fourcc_is_accepted() {
        assert!(ensure_rgb3(b"RGB3", "/dev/video0").is_ok());
    }

    #[test]
    fn foreign_fourcc_is_rejected() {
        for fourcc in [b"YUYV", b"MJPG", b"NV12"] {
            let err = ensure_rgb3(fourcc, "/dev/video0").unwrap_err();
            assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        }
    }

    #[test]
    fn frame_length_must_match_negotiated_dimensions() {
        assert!(check_frame_len(rgb_byte_len(640, 480), 640, 480).is_ok());
        // A YUYV payload for the same dimensions is two bytes per pixel.
        let err = check_frame_len(640 * 480 * 2, 640, 480).unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert!(check_frame_len(0, 640, 480).is_err());
    }
}
