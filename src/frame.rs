//! Frames and the shared raster surface.
//!
//! - `VideoFrame`: one sampled camera frame (RGB8). Owned by exactly one
//!   detect+draw cycle; never retained past it.
//! - `FrameSurface`: the raster the overlay is drawn onto. Sized exactly to
//!   the current frame's native resolution, reallocated when dimensions
//!   change, cleared before each redraw.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};

use crate::error::SnapshotError;

/// Number of bytes in an RGB8 frame of the given dimensions.
pub fn rgb_byte_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// One captured frame. Pixel layout is tightly packed RGB8, row-major.
pub struct VideoFrame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic per-session frame counter, assigned at capture time.
    pub seq: u64,
}

impl VideoFrame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, seq: u64) -> Self {
        debug_assert_eq!(pixels.len(), rgb_byte_len(width, height));
        Self {
            pixels,
            width,
            height,
            seq,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Mutable raster buffer for the live overlay and snapshots.
///
/// Access is serialized by the owner (an async mutex shared between the
/// detection loop and snapshot capture), so a snapshot draw never interleaves
/// with a loop cycle.
pub struct FrameSurface {
    image: RgbImage,
    generation: u64,
}

impl FrameSurface {
    pub fn new() -> Self {
        Self {
            image: RgbImage::new(0, 0),
            generation: 0,
        }
    }

    /// Size the surface to the frame and copy its pixels in.
    ///
    /// Reallocates only when the frame dimensions changed (camera
    /// reconfiguration); otherwise overwrites in place, which also serves as
    /// the per-redraw clear.
    pub fn blit(&mut self, frame: &VideoFrame) {
        if self.image.width() != frame.width || self.image.height() != frame.height {
            self.image = RgbImage::new(frame.width, frame.height);
        }
        self.image.copy_from_slice(frame.pixels());
        self.generation += 1;
    }

    /// Clear to black without resizing. Used when capture stops.
    pub fn clear(&mut self) {
        self.image.fill(0);
        self.generation += 1;
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Count of mutations applied to this surface. Lets callers (and tests)
    /// observe whether a draw happened without inspecting pixels.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub(crate) fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Encode the composed surface as PNG bytes.
    pub fn encode_png(&self) -> Result<Vec<u8>, SnapshotError> {
        if self.image.width() == 0 || self.image.height() == 0 {
            return Err(SnapshotError::Encode("surface has no pixels".to_string()));
        }
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(
                self.image.as_raw(),
                self.image.width(),
                self.image.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| SnapshotError::Encode(e.to_string()))?;
        Ok(bytes)
    }
}

impl Default for FrameSurface {
    fn default() -> Self {
        Self::new()
    }
}
