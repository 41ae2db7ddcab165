//! 68-point landmark regression, reduced to the two six-point eye contours.
//!
//! The model sees a square crop around each face box and returns 68 (x, y)
//! pairs normalized to that crop. Points 36–41 outline the left eye and
//! 42–47 the right eye, in the usual iBUG ordering.

use crate::types::{EyeLandmarks, FaceLocation, Point};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const LANDMARK_INPUT_SIZE: u32 = 112;
const LANDMARK_POINTS: usize = 68;
const LEFT_EYE: std::ops::Range<usize> = 36..42;
const RIGHT_EYE: std::ops::Range<usize> = 42..48;
/// Margin added around the face box on every side, as a fraction of its longer edge.
const CROP_MARGIN: f32 = 0.1;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Square region of the source image fed to the model.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Crop {
    x: u32,
    y: u32,
    size: u32,
}

impl Crop {
    /// Square around `loc`, grown by the margin and kept inside the image.
    /// `None` for empty boxes.
    fn around(loc: &FaceLocation, width: u32, height: u32) -> Option<Crop> {
        let side = loc.width().max(loc.height());
        if side == 0 || width == 0 || height == 0 {
            return None;
        }
        let side = ((side as f32) * (1.0 + 2.0 * CROP_MARGIN)).round() as u32;
        let size = side.min(width).min(height).max(1);

        let cx = (loc.left + loc.right) / 2;
        let cy = (loc.top + loc.bottom) / 2;
        let x = cx.saturating_sub(size / 2).min(width - size);
        let y = cy.saturating_sub(size / 2).min(height - size);
        Some(Crop { x, y, size })
    }

    fn to_image(&self, (nx, ny): Point) -> Point {
        (
            self.x as f32 + nx * self.size as f32,
            self.y as f32 + ny * self.size as f32,
        )
    }
}

pub struct LandmarkEstimator {
    session: Session,
}

impl LandmarkEstimator {
    pub fn load(model_path: &Path) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded landmark model");
        Ok(Self { session })
    }

    /// Eye contours for one face, or `None` for a degenerate box.
    pub fn estimate(
        &mut self,
        image: &RgbImage,
        location: &FaceLocation,
    ) -> Result<Option<EyeLandmarks>, LandmarkError> {
        let (w, h) = image.dimensions();
        let Some(crop) = Crop::around(location, w, h) else {
            return Ok(None);
        };

        let patch = image::imageops::crop_imm(image, crop.x, crop.y, crop.size, crop.size).to_image();
        let patch = image::imageops::resize(
            &patch,
            LANDMARK_INPUT_SIZE,
            LANDMARK_INPUT_SIZE,
            FilterType::Triangle,
        );
        let input = preprocess(&patch);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmark extraction: {e}")))?;

        eyes_from_raw(raw, &crop).map(Some)
    }
}

fn preprocess(patch: &RgbImage) -> Array4<f32> {
    let n = LANDMARK_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, n, n));
    for (x, y, pixel) in patch.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

fn eyes_from_raw(raw: &[f32], crop: &Crop) -> Result<EyeLandmarks, LandmarkError> {
    if raw.len() < LANDMARK_POINTS * 2 {
        return Err(LandmarkError::InferenceFailed(format!(
            "expected {} landmark values, got {}",
            LANDMARK_POINTS * 2,
            raw.len()
        )));
    }
    let point = |i: usize| crop.to_image((raw[i * 2], raw[i * 2 + 1]));
    let eye = |range: std::ops::Range<usize>| -> [Point; 6] {
        std::array::from_fn(|k| point(range.start + k))
    };
    Ok(EyeLandmarks {
        left_eye: eye(LEFT_EYE),
        right_eye: eye(RIGHT_EYE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_grows_and_centers() {
        let loc = FaceLocation::new(100, 200, 200, 100);
        let crop = Crop::around(&loc, 640, 480).unwrap();
        assert_eq!(crop, Crop { x: 90, y: 90, size: 120 });
    }

    #[test]
    fn test_crop_stays_inside_image() {
        let loc = FaceLocation::new(0, 60, 60, 0);
        let crop = Crop::around(&loc, 64, 48).unwrap();
        assert!(crop.x + crop.size <= 64);
        assert!(crop.y + crop.size <= 48);
        assert_eq!(crop.size, 48);
    }

    #[test]
    fn test_crop_rejects_empty_box() {
        let loc = FaceLocation::new(10, 10, 10, 10);
        assert!(Crop::around(&loc, 64, 64).is_none());
    }

    #[test]
    fn test_eyes_from_raw_maps_to_image() {
        let crop = Crop { x: 10, y: 20, size: 100 };
        let mut raw = vec![0.0f32; LANDMARK_POINTS * 2];
        raw[36 * 2] = 0.25;
        raw[36 * 2 + 1] = 0.5;
        raw[47 * 2] = 1.0;
        raw[47 * 2 + 1] = 0.0;
        let eyes = eyes_from_raw(&raw, &crop).unwrap();
        assert_eq!(eyes.left_eye[0], (35.0, 70.0));
        assert_eq!(eyes.right_eye[5], (110.0, 20.0));
    }

    #[test]
    fn test_eyes_from_short_output_errors() {
        let crop = Crop { x: 0, y: 0, size: 10 };
        assert!(eyes_from_raw(&[0.0; 10], &crop).is_err());
    }
}
