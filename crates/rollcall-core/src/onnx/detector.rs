//! SCRFD face detector over RGB frames.
//!
//! Letterboxes the frame into the 640×640 model input, decodes the three
//! anchor-free stride heads and suppresses overlaps.

use crate::types::{FaceLocation, Point};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A raw detection in source-image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    /// Eyes, nose tip and mouth corners.
    pub keypoints: Option<[Point; 5]>,
}

impl Detection {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Integer box clamped to an image of the given size.
    pub fn location(&self, width: u32, height: u32) -> FaceLocation {
        let fit = |v: f32, max: u32| v.round().clamp(0.0, max.saturating_sub(1) as f32) as u32;
        FaceLocation {
            top: fit(self.y1, height),
            right: fit(self.x2, width),
            bottom: fit(self.y2, height),
            left: fit(self.x1, width),
        }
    }
}

/// Maps letterboxed model coordinates back to the source frame.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn unmap(&self, x: f32, y: f32) -> Point {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

pub struct FaceDetector {
    session: Session,
}

impl FaceDetector {
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let outputs = session.outputs().len();
        if outputs < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {outputs}"
            )));
        }

        tracing::info!(path = %model_path.display(), outputs, "loaded SCRFD model");
        Ok(Self { session })
    }

    /// Detect faces, highest confidence first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let (input, letterbox) = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut detections = Vec::new();
        // Standard export order: scores 8/16/32, boxes 8/16/32, keypoints 8/16/32.
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (_, scores) = outputs[pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[pos + 3]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("boxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[pos + 6]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            detections.extend(decode_stride(scores, boxes, kps, stride, &letterbox));
        }

        Ok(nms(detections, SCRFD_NMS_THRESHOLD))
    }
}

/// Letterbox into the square model input and normalize to NCHW floats.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let size = SCRFD_INPUT_SIZE;
    let (w, h) = image.dimensions();
    let scale = (size as f32 / w.max(1) as f32).min(size as f32 / h.max(1) as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let n = size as usize;
    // Padding normalizes to zero.
    let mut tensor = Array4::<f32>::zeros((1, 3, n, n));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (ty, tx) = ((y + pad_y) as usize, (x + pad_x) as usize);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    let letterbox = Letterbox {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
    };
    (tensor, letterbox)
}

fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<Detection> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    let mut out = Vec::new();
    for idx in 0..anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= SCRFD_CONFIDENCE_THRESHOLD {
            continue;
        }
        let Some(b) = boxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let cx = (cell % grid) as f32 * s;
        let cy = (cell / grid) as f32 * s;

        let (x1, y1) = letterbox.unmap(cx - b[0] * s, cy - b[1] * s);
        let (x2, y2) = letterbox.unmap(cx + b[2] * s, cy + b[3] * s);

        let keypoints = kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| letterbox.unmap(cx + k[i * 2] * s, cy + k[i * 2 + 1] * s))
        });

        out.push(Detection {
            x1,
            y1,
            x2,
            y2,
            confidence: score,
            keypoints,
        });
    }
    out
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let inter = Detection {
        x1: a.x1.max(b.x1),
        y1: a.y1.max(b.y1),
        x2: a.x2.min(b.x2),
        y2: a.y2.min(b.y2),
        confidence: 0.0,
        keypoints: None,
    }
    .area();
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Greedy non-maximum suppression; output sorted by confidence.
fn nms(mut detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= threshold) {
            keep.push(det);
        }
    }
    keep
}
