//! 128-dimensional face descriptor extraction (SFace-style network).
//!
//! Input is an aligned 112×112 RGB crop with raw 0–255 values; the output
//! is L2-normalized so Euclidean distances fall in [0, 2].

use crate::types::{Embedding, EMBEDDING_DIM};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const RECOGNIZER_INPUT_SIZE: usize = 112;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded face recognizer model");
        Ok(Self { session })
    }

    /// Describe an aligned 112×112 crop.
    pub fn extract(&mut self, aligned: &RgbImage) -> Result<Embedding, RecognizerError> {
        if aligned.dimensions() != (RECOGNIZER_INPUT_SIZE as u32, RECOGNIZER_INPUT_SIZE as u32) {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {RECOGNIZER_INPUT_SIZE}x{RECOGNIZER_INPUT_SIZE} crop, got {:?}",
                aligned.dimensions()
            )));
        }

        let input = preprocess(aligned);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(l2_normalize(raw)))
    }
}

fn preprocess(aligned: &RgbImage) -> Array4<f32> {
    let n = RECOGNIZER_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, n, n));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_layout() {
        let mut crop = RgbImage::new(112, 112);
        crop.put_pixel(3, 7, image::Rgb([10, 20, 30]));
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert_eq!(tensor[[0, 0, 7, 3]], 10.0);
        assert_eq!(tensor[[0, 1, 7, 3]], 20.0);
        assert_eq!(tensor[[0, 2, 7, 3]], 30.0);
        assert_eq!(tensor[[0, 0, 3, 7]], 0.0);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
