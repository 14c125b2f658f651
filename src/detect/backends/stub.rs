//! Deterministic stub detector for tests and the demo daemon.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::detect::backend::Detector;
use crate::detect::result::{BoundingBox, Detection};
use crate::error::DetectorError;
use crate::frame::VideoFrame;

/// Stub detector. Two operating modes:
///
/// - default: synthesizes a small deterministic scene from the frame
///   contents (a "dog" box orbiting the frame plus a static "car"), so the
///   demo overlay visibly tracks the synthetic camera;
/// - scripted: replays a fixed playlist of detection passes, cycling. Used
///   by tests that need exact detections.
#[derive(Debug)]
pub struct StubDetector {
    script: Option<Vec<Vec<Detection>>>,
    cursor: usize,
    passes: u64,
}

impl StubDetector {
    pub fn new() -> Self {
        Self {
            script: None,
            cursor: 0,
            passes: 0,
        }
    }

    /// Replay `script` entries in order, cycling back to the start.
    pub fn with_script(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: Some(script),
            cursor: 0,
            passes: 0,
        }
    }

    /// Number of detection passes served so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    fn synthesize(&self, frame: &VideoFrame) -> Vec<Detection> {
        let width = frame.width as f32;
        let height = frame.height as f32;
        if width < 32.0 || height < 32.0 {
            return Vec::new();
        }

        // Content hash keeps the output a pure function of the frame.
        let digest: [u8; 32] = Sha256::digest(frame.pixels()).into();
        let jitter = digest[0] as f32 / 255.0;

        let box_w = width / 4.0;
        let box_h = height / 4.0;
        let phase = (frame.seq % 20) as f32 / 20.0;
        let dog = Detection::new(
            "dog",
            0.70 + 0.25 * jitter,
            BoundingBox {
                x: phase * (width - box_w),
                y: (height - box_h) / 2.0,
                width: box_w,
                height: box_h,
            },
        );
        let car = Detection::new(
            "car",
            0.88,
            BoundingBox {
                x: width / 8.0,
                y: height / 8.0,
                width: width / 3.0,
                height: height / 5.0,
            },
        );
        vec![car, dog]
    }
}

impl Default for StubDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Detection>, DetectorError> {
        self.passes += 1;
        match &self.script {
            Some(script) if script.is_empty() => Ok(Vec::new()),
            Some(script) => {
                let pass = script[self.cursor % script.len()].clone();
                self.cursor += 1;
                Ok(pass)
            }
            None => Ok(self.synthesize(frame)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::rgb_byte_len;

    fn frame(seq: u64) -> VideoFrame {
        VideoFrame::new(vec![seq as u8; rgb_byte_len(64, 64)], 64, 64, seq)
    }

    #[tokio::test]
    async fn synthesized_output_is_deterministic() {
        let mut a = StubDetector::new();
        let mut b = StubDetector::new();
        let da = a.detect(&frame(3)).await.unwrap();
        let db = b.detect(&frame(3)).await.unwrap();
        assert_eq!(da, db);
        assert!(!da.is_empty());
        assert!(da.iter().all(|d| (0.0..=1.0).contains(&d.confidence)));
    }

    #[tokio::test]
    async fn scripted_passes_cycle() {
        let pass = vec![Detection::new(
            "cat",
            0.9,
            BoundingBox {
                x: 1.0,
                y: 2.0,
                width: 3.0,
                height: 4.0,
            },
        )];
        let mut detector = StubDetector::with_script(vec![pass.clone(), Vec::new()]);
        assert_eq!(detector.detect(&frame(0)).await.unwrap(), pass);
        assert!(detector.detect(&frame(1)).await.unwrap().is_empty());
        assert_eq!(detector.detect(&frame(2)).await.unwrap(), pass);
        assert_eq!(detector.passes(), 3);
    }
}
