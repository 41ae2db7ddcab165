//! The face-understanding seam.
//!
//! Everything model-specific sits behind [`FaceAnalyzer`]. The rest of the
//! crate only ever asks for boxes, descriptors, eye contours, a distance and
//! a match predicate.

use crate::types::{Embedding, EyeLandmarks, FaceLocation};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] crate::onnx::detector::DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] crate::onnx::recognizer::RecognizerError),
    #[error("landmark error: {0}")]
    Landmarks(#[from] crate::onnx::landmarks::LandmarkError),
}

/// Face detection, description and landmarking over RGB images.
pub trait FaceAnalyzer {
    /// Locate every face in the image.
    fn face_locations(&mut self, image: &RgbImage) -> Result<Vec<FaceLocation>, AnalyzerError>;

    /// Compute one descriptor per location, in the same order.
    fn face_encodings(
        &mut self,
        image: &RgbImage,
        locations: &[FaceLocation],
    ) -> Result<Vec<Embedding>, AnalyzerError>;

    /// Eye contours per location, in the same order; `None` where they could
    /// not be estimated.
    fn face_landmarks(
        &mut self,
        image: &RgbImage,
        locations: &[FaceLocation],
    ) -> Result<Vec<Option<EyeLandmarks>>, AnalyzerError>;

    /// Distance between an enrolled descriptor and a probe.
    fn face_distance(&self, known: &Embedding, probe: &Embedding) -> f32 {
        known.euclidean_distance(probe)
    }

    /// The library's own verdict: inclusive of the tolerance.
    fn is_match(&self, known: &Embedding, probe: &Embedding, tolerance: f32) -> bool {
        self.face_distance(known, probe) <= tolerance
    }
}
