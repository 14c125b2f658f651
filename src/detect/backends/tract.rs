#![cfg(feature = "backend-tract")]

//! ONNX detector backend.
//!
//! Loads a local YOLO-family model (rows of `[cx, cy, w, h, obj, 80 class
//! scores]`) and produces labeled COCO-class detections in frame pixel
//! coordinates. No network I/O; the model file is the only disk access.

use std::path::Path;

use async_trait::async_trait;
use tract_onnx::prelude::*;

use crate::detect::backend::Detector;
use crate::detect::result::{BoundingBox, Detection};
use crate::error::DetectorError;
use crate::frame::VideoFrame;

const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Debug)]
pub struct TractDetector {
    model: RunnableModel,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference on frames
    /// of exactly `width` x `height`.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        confidence_threshold: f32,
    ) -> Result<Self, DetectorError> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| {
                DetectorError::Init(format!(
                    "failed to load ONNX model from {}: {}",
                    model_path.display(),
                    e
                ))
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .map_err(|e| DetectorError::Init(format!("failed to set input fact: {}", e)))?
            .into_optimized()
            .map_err(|e| DetectorError::Init(format!("failed to optimize model: {}", e)))?
            .into_runnable()
            .map_err(|e| DetectorError::Init(format!("failed to build runnable model: {}", e)))?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    fn build_input(&self, frame: &VideoFrame) -> Result<Tensor, DetectorError> {
        if frame.width != self.width || frame.height != self.height {
            return Err(DetectorError::Inference(format!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        let pixels = frame.pixels();
        let width = self.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );
        Ok(input.into_tensor())
    }

    fn parse_output(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>, DetectorError> {
        let output = outputs
            .first()
            .ok_or_else(|| DetectorError::Inference("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| DetectorError::Inference(format!("output tensor was not f32: {}", e)))?;

        let mut candidates = Vec::new();
        for row in view.rows() {
            if row.len() < 5 + COCO_CLASSES.len() {
                continue;
            }
            let objectness = row[4];
            let (class_idx, class_score) = row
                .iter()
                .skip(5)
                .take(COCO_CLASSES.len())
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (idx, &score)| {
                    if score > best.1 {
                        (idx, score)
                    } else {
                        best
                    }
                });
            let confidence = objectness * class_score;
            if confidence < self.confidence_threshold {
                continue;
            }
            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            candidates.push(Detection::new(
                COCO_CLASSES[class_idx],
                confidence.clamp(0.0, 1.0),
                BoundingBox {
                    x: (cx - w / 2.0).max(0.0),
                    y: (cy - h / 2.0).max(0.0),
                    width: w.min(self.width as f32),
                    height: h.min(self.height as f32),
                },
            ));
        }

        Ok(nms(candidates, self.iou_threshold))
    }
}

#[async_trait]
impl Detector for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    async fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Detection>, DetectorError> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| DetectorError::Inference(format!("ONNX inference failed: {}", e)))?;
        self.parse_output(outputs)
    }
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);
    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_unstable_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    let mut suppressed = vec![false; detections.len()];
    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if iou(&detections[i].bbox, &detections[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
        kept.push(detections[i].clone());
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(confidence: f32, x: f32) -> Detection {
        Detection::new(
            "dog",
            confidence,
            BoundingBox {
                x,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
        )
    }

    #[test]
    fn nms_suppresses_overlaps_keeps_best() {
        let out = nms(vec![det(0.6, 0.0), det(0.9, 1.0), det(0.8, 100.0)], 0.45);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].confidence, 0.9);
        assert_eq!(out[1].confidence, 0.8);
    }

    #[test]
    fn iou_disjoint_is_zero() {
        assert_eq!(iou(&det(1.0, 0.0).bbox, &det(1.0, 100.0).bbox), 0.0);
    }
}
