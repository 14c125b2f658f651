use async_trait::async_trait;

use crate::detect::result::Detection;
use crate::error::DetectorError;
use crate::frame::VideoFrame;

/// Detector trait: the opaque model collaborator.
///
/// The kernel only calls `detect` and consumes its output. Implementations
/// may take arbitrarily long per call; the detection loop tolerates variable
/// latency and discards results whose capture session has already stopped.
///
/// Implementations must treat the frame as read-only and must not retain it
/// past the call.
#[async_trait]
pub trait Detector: Send + std::fmt::Debug {
    /// Backend identifier, used in logs.
    fn name(&self) -> &'static str;

    /// Optional warm-up hook. A warm-up failure is fatal to camera
    /// activation: the controller refuses to start until a detector loads.
    async fn warm_up(&mut self) -> Result<(), DetectorError> {
        Ok(())
    }

    /// Run one detection pass over the frame.
    async fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Detection>, DetectorError>;
}
