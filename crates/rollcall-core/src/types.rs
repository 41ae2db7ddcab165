use serde::{Deserialize, Serialize};

/// Dimensionality of the face descriptor the matcher is calibrated for.
pub const EMBEDDING_DIM: usize = 128;

/// A 2-D landmark coordinate in image pixels.
pub type Point = (f32, f32);

/// Face bounding box in `(top, right, bottom, left)` pixel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceLocation {
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Map a box found on a downscaled frame back to full resolution.
    /// Coordinates are rounded to the nearest pixel.
    pub fn scaled(&self, factor: f32) -> Self {
        let scale = |v: u32| (v as f32 * factor).round() as u32;
        Self {
            top: scale(self.top),
            right: scale(self.right),
            bottom: scale(self.bottom),
            left: scale(self.left),
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Face descriptor produced by the recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Six-point eye contours for one face.
///
/// Points run around the eye: 0 and 3 are the horizontal corners,
/// 1 and 2 the upper lid, 4 and 5 the lower lid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeLandmarks {
    pub left_eye: [Point; 6],
    pub right_eye: [Point; 6],
}

/// Everything the analyzer reported for one face in one frame.
///
/// Coordinates are in downscaled-frame space. Never persisted.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub location: FaceLocation,
    pub embedding: Embedding,
    pub landmarks: Option<EyeLandmarks>,
}

/// An enrolled person: label taken from the enrollment file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownIdentity {
    pub label: String,
    pub embedding: Embedding,
}

/// One persisted attendance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.5, -0.25, 1.0]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
        assert!((b.euclidean_distance(&a) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_location_scaled_to_full_resolution() {
        let loc = FaceLocation::new(10, 60, 70, 20);
        let full = loc.scaled(4.0);
        assert_eq!(full, FaceLocation::new(40, 240, 280, 80));
        assert_eq!(full.width(), 160);
        assert_eq!(full.height(), 240);
    }

    #[test]
    fn test_location_scaled_by_fractional_factor() {
        // 640x480 analyzed at 0.3 is 192x144; the last column maps back near 640.
        let loc = FaceLocation::new(0, 191, 143, 0);
        let full = loc.scaled(1.0 / 0.3);
        assert_eq!(full, FaceLocation::new(0, 637, 477, 0));
    }

    #[test]
    fn test_location_degenerate_dimensions() {
        let loc = FaceLocation::new(50, 10, 40, 20);
        assert_eq!(loc.width(), 0);
        assert_eq!(loc.height(), 0);
    }
}
