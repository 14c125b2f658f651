#![cfg(feature = "camera-http")]

//! HTTP camera backend for ESP32-class network cameras.
//!
//! Supports multipart MJPEG streams and single-JPEG snapshot endpoints.
//! Torch control uses the conventional lamp endpoint
//! (`/control?var=lamp&val=<0|100>`) next to the stream path; the endpoint's
//! `torch` flag declares that the camera has one.
//!
//! ureq is blocking, so reads run under `spawn_blocking`; the stream handle
//! is moved into the blocking task and back.

use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::capture::{CameraBackend, CameraEndpoint};
use crate::error::CaptureError;
use crate::frame::VideoFrame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpCamera {
    endpoint: CameraEndpoint,
    stream: Option<HttpStream>,
    frame_count: u64,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    SingleJpeg,
}

impl HttpCamera {
    pub fn new(endpoint: CameraEndpoint) -> Self {
        Self {
            endpoint,
            stream: None,
            frame_count: 0,
        }
    }

    fn lamp_url(&self, on: bool) -> Result<String, CaptureError> {
        let mut url = Url::parse(&self.endpoint.url)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("invalid camera url: {}", e)))?;
        url.set_path("/control");
        url.set_query(Some(if on { "var=lamp&val=100" } else { "var=lamp&val=0" }));
        Ok(url.into())
    }
}

fn map_http_error(err: ureq::Error, url: &str) -> CaptureError {
    match err {
        ureq::Error::Status(401 | 403, _) => {
            CaptureError::PermissionDenied(format!("camera at {} rejected the request", url))
        }
        other => CaptureError::DeviceUnavailable(format!("camera at {}: {}", url, other)),
    }
}

#[async_trait]
impl CameraBackend for HttpCamera {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open(&mut self) -> Result<(), CaptureError> {
        let url = self.endpoint.url.clone();
        let stream = tokio::task::spawn_blocking(move || {
            let response = ureq::get(&url)
                .timeout(CONNECT_TIMEOUT)
                .call()
                .map_err(|e| map_http_error(e, &url))?;
            let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
            if content_type.contains("multipart") {
                Ok::<_, CaptureError>(HttpStream::Mjpeg(MjpegStream::new(response.into_reader())))
            } else {
                Ok(HttpStream::SingleJpeg)
            }
        })
        .await
        .map_err(|e| CaptureError::DeviceUnavailable(format!("camera open task failed: {}", e)))??;

        self.stream = Some(stream);
        log::info!("http camera {} connected", self.endpoint.url);
        Ok(())
    }

    async fn sample_frame(&mut self) -> Result<VideoFrame, CaptureError> {
        let stream = self.stream.take().ok_or(CaptureError::SessionClosed)?;
        let url = self.endpoint.url.clone();

        let (stream, result) = tokio::task::spawn_blocking(move || {
            let mut stream = stream;
            let result = match &mut stream {
                HttpStream::Mjpeg(mjpeg) => mjpeg.next_frame(),
                HttpStream::SingleJpeg => fetch_single_jpeg(&url),
            };
            (stream, result)
        })
        .await
        .map_err(|e| CaptureError::DeviceUnavailable(format!("camera read task failed: {}", e)))?;

        self.stream = Some(stream);
        let jpeg_bytes = result?;
        let (pixels, width, height) = decode_jpeg(&jpeg_bytes)?;
        self.frame_count += 1;
        Ok(VideoFrame::new(pixels, width, height, 0))
    }

    fn torch_supported(&self) -> bool {
        self.endpoint.torch
    }

    async fn set_torch(&mut self, on: bool) -> Result<(), CaptureError> {
        if !self.endpoint.torch {
            return Err(CaptureError::TorchUnsupported);
        }
        let lamp_url = self.lamp_url(on)?;
        tokio::task::spawn_blocking(move || {
            ureq::get(&lamp_url)
                .timeout(CONNECT_TIMEOUT)
                .call()
                .map_err(|e| CaptureError::TorchControlFailed(e.to_string()))
                .map(|_| ())
        })
        .await
        .map_err(|e| CaptureError::TorchControlFailed(format!("torch task failed: {}", e)))?
    }

    async fn close(&mut self) {
        self.stream = None;
        log::debug!(
            "http camera {} released after {} frames",
            self.endpoint.url,
            self.frame_count
        );
    }
}

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
const READ_CHUNK: usize = 8 * 1024;

/// Incremental MJPEG part parser over a blocking reader.
///
/// `pending` holds bytes read but not yet consumed; part headers and
/// boundary lines before a frame are discarded while hunting for the JPEG
/// start marker, and each returned frame is drained off the front so the
/// bytes after it seed the next call.
struct MjpegStream {
    reader: Box<dyn Read + Send>,
    pending: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            pending: Vec::with_capacity(64 * 1024),
        }
    }

    fn next_frame(&mut self) -> Result<Vec<u8>, CaptureError> {
        self.align_to_frame_start()?;

        // `pending` now begins with the start marker. Scan for the end
        // marker, resuming where the previous pass left off after each
        // refill instead of rescanning the whole buffer.
        let mut scanned = JPEG_SOI.len();
        loop {
            while scanned + 2 <= self.pending.len() {
                if self.pending[scanned..scanned + 2] == JPEG_EOI {
                    let frame: Vec<u8> = self.pending.drain(..scanned + 2).collect();
                    return Ok(frame);
                }
                scanned += 1;
            }

            if self.pending.len() > MAX_JPEG_BYTES {
                self.pending.clear();
                return Err(CaptureError::DeviceUnavailable(format!(
                    "mjpeg frame exceeded {} bytes without terminating",
                    MAX_JPEG_BYTES
                )));
            }
            self.refill()?;
        }
    }

    /// Discard everything up to the next JPEG start marker.
    fn align_to_frame_start(&mut self) -> Result<(), CaptureError> {
        loop {
            if let Some(pos) = self.pending.windows(2).position(|w| w == JPEG_SOI) {
                self.pending.drain(..pos);
                return Ok(());
            }
            // The marker may straddle a read boundary; keep the last byte.
            if self.pending.len() > 1 {
                let tail = self.pending.len() - 1;
                self.pending.drain(..tail);
            }
            self.refill()?;
        }
    }

    fn refill(&mut self) -> Result<(), CaptureError> {
        let mut chunk = [0u8; READ_CHUNK];
        let read = self
            .reader
            .read(&mut chunk)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("mjpeg read: {}", e)))?;
        if read == 0 {
            return Err(CaptureError::DeviceUnavailable(
                "mjpeg stream ended".to_string(),
            ));
        }
        self.pending.extend_from_slice(&chunk[..read]);
        Ok(())
    }
}

fn fetch_single_jpeg(url: &str) -> Result<Vec<u8>, CaptureError> {
    let response = ureq::get(url)
        .timeout(CONNECT_TIMEOUT)
        .call()
        .map_err(|e| map_http_error(e, url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .map_err(|e| CaptureError::DeviceUnavailable(format!("jpeg snapshot read: {}", e)))?;
    if bytes.is_empty() {
        return Err(CaptureError::DeviceUnavailable(
            "empty jpeg snapshot".to_string(),
        ));
    }
    Ok(bytes)
}

fn decode_jpeg(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32), CaptureError> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| CaptureError::DeviceUnavailable(format!("decode jpeg: {}", e)))?;
    let rgb = image.into_rgb8();
    let (width, height) = rgb.dimensions();
    Ok((rgb.into_raw(), width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_over(bytes: Vec<u8>) -> MjpegStream {
        MjpegStream::new(Box::new(std::io::Cursor::new(bytes)))
    }

    fn part(payload: &[u8]) -> Vec<u8> {
        let mut data = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        data.extend_from_slice(&JPEG_SOI);
        data.extend_from_slice(payload);
        data.extend_from_slice(&JPEG_EOI);
        data.extend_from_slice(b"\r\n");
        data
    }

    #[test]
    fn frame_extracted_from_multipart_noise() {
        let mut stream = stream_over(part(&[1, 2, 3]));
        let frame = stream.next_frame().unwrap();
        assert_eq!(frame, vec![0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
    }

    #[test]
    fn consecutive_frames_parse_in_order() {
        let mut data = part(&[10]);
        data.extend_from_slice(&part(&[20]));
        let mut stream = stream_over(data);
        assert_eq!(stream.next_frame().unwrap(), vec![0xFF, 0xD8, 10, 0xFF, 0xD9]);
        assert_eq!(stream.next_frame().unwrap(), vec![0xFF, 0xD8, 20, 0xFF, 0xD9]);
    }

    #[test]
    fn truncated_stream_reports_end() {
        let mut stream = stream_over(vec![0xFF, 0xD8, 1, 2, 3]);
        let err = stream.next_frame().unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }

    #[test]
    fn unterminated_frame_is_bounded() {
        let mut data = vec![0xFF, 0xD8];
        data.resize(MAX_JPEG_BYTES + READ_CHUNK * 2, 0);
        let mut stream = stream_over(data);
        let err = stream.next_frame().unwrap_err();
        assert!(err.to_string().contains("exceeded"));
    }

    #[test]
    fn lamp_url_targets_control_endpoint() {
        let cam = HttpCamera::new(CameraEndpoint {
            url: "http://127.0.0.1:81/stream".to_string(),
            facing: None,
            width: 640,
            height: 480,
            torch: true,
        });
        assert_eq!(
            cam.lamp_url(true).unwrap(),
            "http://127.0.0.1:81/control?var=lamp&val=100"
        );
        assert_eq!(
            cam.lamp_url(false).unwrap(),
            "http://127.0.0.1:81/control?var=lamp&val=0"
        );
    }
}
