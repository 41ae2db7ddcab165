//! [`FaceAnalyzer`] backed by ONNX Runtime: SCRFD detection, a 128-d
//! recognizer on aligned crops, and a 68-point landmark regressor.

pub mod alignment;
pub mod detector;
pub mod landmarks;
pub mod recognizer;

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::types::{Embedding, EyeLandmarks, FaceLocation};
use detector::{Detection, FaceDetector};
use image::imageops::FilterType;
use image::RgbImage;
use landmarks::LandmarkEstimator;
use recognizer::FaceRecognizer;
use std::path::{Path, PathBuf};

pub const DETECTOR_MODEL: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL: &str = "face_recognition_sface_2021dec.onnx";
pub const LANDMARK_MODEL: &str = "landmarks_68.onnx";

/// Locations of the three model files.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
    pub landmarks: PathBuf,
}

impl ModelPaths {
    /// Standard file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join(DETECTOR_MODEL),
            recognizer: dir.join(RECOGNIZER_MODEL),
            landmarks: dir.join(LANDMARK_MODEL),
        }
    }
}

pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    landmarks: LandmarkEstimator,
    /// Detections from the latest `face_locations` call, keyed by the box
    /// handed back, so encodings can reuse their keypoints.
    last: Vec<(FaceLocation, Detection)>,
}

impl OnnxAnalyzer {
    pub fn load(paths: &ModelPaths) -> Result<Self, AnalyzerError> {
        Ok(Self {
            detector: FaceDetector::load(&paths.detector)?,
            recognizer: FaceRecognizer::load(&paths.recognizer)?,
            landmarks: LandmarkEstimator::load(&paths.landmarks)?,
            last: Vec::new(),
        })
    }

    /// Aligned crop for a box, using detector keypoints when available and a
    /// plain resize of the box otherwise.
    fn aligned_crop(&self, image: &RgbImage, location: &FaceLocation) -> RgbImage {
        let keypoints = self
            .last
            .iter()
            .find(|(loc, _)| loc == location)
            .and_then(|(_, det)| det.keypoints);

        match keypoints {
            Some(kps) => alignment::align_face(image, &kps),
            None => {
                let w = location.width().max(1);
                let h = location.height().max(1);
                let crop =
                    image::imageops::crop_imm(image, location.left, location.top, w, h).to_image();
                image::imageops::resize(
                    &crop,
                    alignment::ALIGNED_SIZE,
                    alignment::ALIGNED_SIZE,
                    FilterType::Triangle,
                )
            }
        }
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn face_locations(&mut self, image: &RgbImage) -> Result<Vec<FaceLocation>, AnalyzerError> {
        let (w, h) = image.dimensions();
        let detections = self.detector.detect(image)?;
        self.last = detections
            .into_iter()
            .map(|det| (det.location(w, h), det))
            .collect();
        tracing::debug!(faces = self.last.len(), "faces detected");
        Ok(self.last.iter().map(|(loc, _)| *loc).collect())
    }

    fn face_encodings(
        &mut self,
        image: &RgbImage,
        locations: &[FaceLocation],
    ) -> Result<Vec<Embedding>, AnalyzerError> {
        let mut embeddings = Vec::with_capacity(locations.len());
        for location in locations {
            let aligned = self.aligned_crop(image, location);
            embeddings.push(self.recognizer.extract(&aligned)?);
        }
        Ok(embeddings)
    }

    fn face_landmarks(
        &mut self,
        image: &RgbImage,
        locations: &[FaceLocation],
    ) -> Result<Vec<Option<EyeLandmarks>>, AnalyzerError> {
        locations
            .iter()
            .map(|location| {
                self.landmarks
                    .estimate(image, location)
                    .map_err(AnalyzerError::from)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths_in_dir() {
        let paths = ModelPaths::in_dir(Path::new("/opt/models"));
        assert_eq!(paths.detector, Path::new("/opt/models/det_10g.onnx"));
        assert_eq!(
            paths.recognizer,
            Path::new("/opt/models/face_recognition_sface_2021dec.onnx")
        );
        assert_eq!(paths.landmarks, Path::new("/opt/models/landmarks_68.onnx"));
    }

    #[test]
    fn test_load_missing_models_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxAnalyzer::load(&ModelPaths::in_dir(dir.path()))
            .err()
            .expect("loading from an empty directory must fail");
        assert!(matches!(
            err,
            AnalyzerError::Detector(detector::DetectorError::ModelNotFound(_))
        ));
    }
}
