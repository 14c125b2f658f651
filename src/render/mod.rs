//! Overlay rendering: frame blit plus boxes and labels.

mod font;

use std::sync::Arc;

use image::Rgb;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::frame::{FrameSurface, VideoFrame};
use crate::mode::AnimalClassSet;

const BOX_STROKE_PX: i32 = 3;
const LABEL_PAD_PX: i32 = 10;
const LABEL_HEIGHT_PX: i32 = 25;
const LABEL_TEXT_SCALE: i32 = 2;
const LABEL_TEXT_INSET_X: i32 = 5;

/// Per-category colors, fixed for the whole session so a class always renders
/// the same: animals green, people blue, everything else red.
const COLOR_ANIMAL: Rgb<u8> = Rgb([46, 204, 113]);
const COLOR_PERSON: Rgb<u8> = Rgb([52, 152, 219]);
const COLOR_OTHER: Rgb<u8> = Rgb([231, 76, 60]);
const COLOR_LABEL_TEXT: Rgb<u8> = Rgb([255, 255, 255]);

/// Draws filtered detections onto the frame surface.
///
/// Stateless apart from the class set used for color selection; cheap to
/// clone across the detection loop and snapshot capture.
#[derive(Clone)]
pub struct OverlayRenderer {
    animals: Arc<AnimalClassSet>,
}

impl OverlayRenderer {
    pub fn new(animals: Arc<AnimalClassSet>) -> Self {
        Self { animals }
    }

    /// Clear the surface, draw the raw frame, then each detection in input
    /// order: stroked bounding box, filled label background, label text.
    /// Input order defines z-order; later entries draw on top.
    pub fn draw(&self, surface: &mut FrameSurface, frame: &VideoFrame, detections: &[Detection]) {
        surface.blit(frame);
        for detection in detections {
            self.draw_detection(surface, detection);
        }
    }

    fn draw_detection(&self, surface: &mut FrameSurface, detection: &Detection) {
        let color = self.class_color(&detection.label);
        let x = detection.bbox.x.round() as i32;
        let y = detection.bbox.y.round() as i32;
        let width = detection.bbox.width.round().max(1.0) as u32;
        let height = detection.bbox.height.round().max(1.0) as u32;
        let image = surface.image_mut();

        // Stroke by drawing nested 1px rectangles, widening outward.
        for offset in 0..BOX_STROKE_PX {
            let rect = Rect::at(x - offset, y - offset)
                .of_size(width + (offset * 2) as u32, height + (offset * 2) as u32);
            draw_hollow_rect_mut(image, rect, color);
        }

        let label = format_label(detection);
        let bg_width = (font::text_width(&label, LABEL_TEXT_SCALE) + LABEL_PAD_PX).max(1) as u32;
        draw_filled_rect_mut(
            image,
            Rect::at(x, y).of_size(bg_width, LABEL_HEIGHT_PX as u32),
            color,
        );

        let text_y = y + (LABEL_HEIGHT_PX - font::text_height(LABEL_TEXT_SCALE)) / 2;
        font::draw_text(
            image,
            &label,
            x + LABEL_TEXT_INSET_X,
            text_y,
            LABEL_TEXT_SCALE,
            COLOR_LABEL_TEXT,
        );
    }

    fn class_color(&self, label: &str) -> Rgb<u8> {
        if self.animals.contains(label) {
            COLOR_ANIMAL
        } else if label == "person" {
            COLOR_PERSON
        } else {
            COLOR_OTHER
        }
    }
}

fn format_label(detection: &Detection) -> String {
    format!(
        "{} ({}%)",
        detection.label,
        (detection.confidence * 100.0).round() as i32
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::frame::rgb_byte_len;

    fn renderer() -> OverlayRenderer {
        OverlayRenderer::new(Arc::new(AnimalClassSet::default()))
    }

    fn frame(width: u32, height: u32) -> VideoFrame {
        VideoFrame::new(vec![0; rgb_byte_len(width, height)], width, height, 1)
    }

    fn det(label: &str, confidence: f32, x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection::new(
            label,
            confidence,
            BoundingBox {
                x,
                y,
                width: w,
                height: h,
            },
        )
    }

    #[test]
    fn label_text_includes_rounded_percent() {
        assert_eq!(format_label(&det("dog", 0.804, 0.0, 0.0, 1.0, 1.0)), "dog (80%)");
        assert_eq!(format_label(&det("car", 0.915, 0.0, 0.0, 1.0, 1.0)), "car (92%)");
    }

    #[test]
    fn draw_strokes_box_in_class_color() {
        let mut surface = FrameSurface::new();
        let r = renderer();
        r.draw(
            &mut surface,
            &frame(200, 200),
            &[det("dog", 0.8, 50.0, 80.0, 60.0, 40.0)],
        );
        // Box edge pixel (left edge, below the 25px label strip).
        assert_eq!(surface.image().get_pixel(50, 110).0, [46, 204, 113]);
    }

    #[test]
    fn non_animal_non_person_is_red() {
        let mut surface = FrameSurface::new();
        renderer().draw(
            &mut surface,
            &frame(200, 200),
            &[det("car", 0.9, 50.0, 80.0, 60.0, 40.0)],
        );
        assert_eq!(surface.image().get_pixel(50, 110).0, [231, 76, 60]);
    }

    #[test]
    fn person_is_blue() {
        let mut surface = FrameSurface::new();
        renderer().draw(
            &mut surface,
            &frame(200, 200),
            &[det("person", 0.9, 50.0, 80.0, 60.0, 40.0)],
        );
        assert_eq!(surface.image().get_pixel(50, 110).0, [52, 152, 219]);
    }

    #[test]
    fn label_background_filled_at_box_origin() {
        let mut surface = FrameSurface::new();
        renderer().draw(
            &mut surface,
            &frame(200, 200),
            &[det("dog", 0.8, 20.0, 20.0, 100.0, 100.0)],
        );
        // A pixel inside the label strip that is not a text pixel column 4
        // (inset is 5): background color.
        assert_eq!(surface.image().get_pixel(24, 22).0, [46, 204, 113]);
    }

    #[test]
    fn later_detections_draw_on_top() {
        let mut surface = FrameSurface::new();
        renderer().draw(
            &mut surface,
            &frame(200, 200),
            &[
                det("dog", 0.8, 10.0, 10.0, 80.0, 80.0),
                det("car", 0.9, 10.0, 10.0, 80.0, 80.0),
            ],
        );
        // Same origin: the car's label background overwrites the dog's.
        assert_eq!(surface.image().get_pixel(12, 12).0, [231, 76, 60]);
    }

    #[test]
    fn draw_clips_boxes_at_frame_edges() {
        let mut surface = FrameSurface::new();
        // Box extends past every edge; must not panic.
        renderer().draw(
            &mut surface,
            &frame(64, 64),
            &[det("dog", 0.8, -10.0, -10.0, 200.0, 200.0)],
        );
    }
}
