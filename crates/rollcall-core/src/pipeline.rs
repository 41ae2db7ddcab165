//! One pass per captured frame: downscale, analyze, blink check, match,
//! gate, persist, annotate.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::backend::{self, AttendanceBackend};
use crate::liveness::{LivenessConfig, LivenessDetector};
use crate::matcher::{FaceMatch, FrameMatcher, MatcherConfig};
use crate::overlay::{FaceOverlay, UNKNOWN_CAPTION};
use crate::session::{AttendanceSession, LivenessPolicy, Recorded, WriteFailure};
use crate::store::EmbeddingStore;
use crate::types::DetectedFace;
use image::imageops::FilterType;
use image::RgbImage;
use std::borrow::Cow;
use thiserror::Error;

pub const DEFAULT_DOWNSCALE: f32 = 0.25;

/// A frame that could not be analyzed. Storage failures are reported per
/// face in [`FrameOutcome::failed`] instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Fraction of capture resolution handed to the analyzer, in (0, 1].
    pub downscale: f32,
    pub match_threshold: f32,
    pub library_tolerance: f32,
    pub liveness: LivenessConfig,
    pub policy: LivenessPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let matcher = MatcherConfig::default();
        Self {
            downscale: DEFAULT_DOWNSCALE,
            match_threshold: matcher.match_threshold,
            library_tolerance: matcher.library_tolerance,
            liveness: LivenessConfig::default(),
            policy: LivenessPolicy::Required,
        }
    }
}

impl PipelineConfig {
    /// Factor taking analyzer coordinates back to capture resolution.
    pub fn upscale(&self) -> f32 {
        if self.downscale > 0.0 && self.downscale < 1.0 {
            1.0 / self.downscale
        } else {
            1.0
        }
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            match_threshold: self.match_threshold,
            library_tolerance: self.library_tolerance,
            upscale: self.upscale(),
        }
    }
}

/// What one frame produced.
#[derive(Debug)]
pub struct FrameOutcome {
    pub faces: Vec<FaceMatch>,
    pub overlays: Vec<FaceOverlay>,
    pub blinked: bool,
    pub recording: bool,
    pub recorded: Vec<Recorded>,
    pub failed: Vec<WriteFailure>,
}

/// Shrink a frame by `factor` for analysis. Factors outside (0, 1) leave it as is.
pub fn downscale(frame: &RgbImage, factor: f32) -> Cow<'_, RgbImage> {
    if !(factor > 0.0 && factor < 1.0) {
        return Cow::Borrowed(frame);
    }
    let (w, h) = frame.dimensions();
    let nw = ((w as f32 * factor).round() as u32).max(1);
    let nh = ((h as f32 * factor).round() as u32).max(1);
    Cow::Owned(image::imageops::resize(frame, nw, nh, FilterType::Triangle))
}

/// Owns every piece of per-run state and drives them frame by frame.
pub struct FramePipeline {
    analyzer: Box<dyn FaceAnalyzer>,
    store: EmbeddingStore,
    liveness: LivenessDetector,
    matcher: FrameMatcher,
    session: AttendanceSession,
    backend: Box<dyn AttendanceBackend>,
    downscale: f32,
}

impl FramePipeline {
    pub fn new(
        config: PipelineConfig,
        analyzer: Box<dyn FaceAnalyzer>,
        store: EmbeddingStore,
        backend: Box<dyn AttendanceBackend>,
    ) -> Self {
        Self {
            analyzer,
            store,
            liveness: LivenessDetector::new(config.liveness),
            matcher: FrameMatcher::new(config.matcher_config()),
            session: AttendanceSession::new(config.policy),
            backend,
            downscale: config.downscale,
        }
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    pub fn session(&self) -> &AttendanceSession {
        &self.session
    }

    pub fn liveness(&self) -> &LivenessDetector {
        &self.liveness
    }

    pub fn backend(&self) -> &dyn AttendanceBackend {
        self.backend.as_ref()
    }

    /// The user's start command.
    pub fn start_recording(&mut self) -> bool {
        self.session.start()
    }

    /// Process a capture-resolution frame stamped with the current local time.
    pub fn process(&mut self, frame: &RgbImage) -> Result<FrameOutcome, PipelineError> {
        self.process_at(frame, &backend::now_timestamp())
    }

    pub fn process_at(
        &mut self,
        frame: &RgbImage,
        timestamp: &str,
    ) -> Result<FrameOutcome, PipelineError> {
        let small = downscale(frame, self.downscale);

        let locations = self.analyzer.face_locations(&small)?;
        let encodings = self.analyzer.face_encodings(&small, &locations)?;
        let landmarks = self.analyzer.face_landmarks(&small, &locations)?;

        let detected: Vec<DetectedFace> = locations
            .into_iter()
            .zip(encodings)
            .zip(landmarks.into_iter().chain(std::iter::repeat(None)))
            .map(|((location, embedding), landmarks)| DetectedFace {
                location,
                embedding,
                landmarks,
            })
            .collect();

        let eyes: Vec<_> = detected.iter().filter_map(|face| face.landmarks).collect();
        let blinked = self.liveness.update(&eyes);

        let faces = self
            .matcher
            .match_frame(self.analyzer.as_ref(), &self.store, &detected);

        let writes = self
            .session
            .process(self.backend.as_mut(), &faces, blinked, timestamp);

        let overlays = faces
            .iter()
            .map(|face| FaceOverlay {
                location: face.location,
                caption: face.name().unwrap_or_else(|| UNKNOWN_CAPTION.to_string()),
                status: self.session.display_status(face, blinked),
            })
            .collect();

        tracing::trace!(faces = faces.len(), blinked, "frame processed");

        Ok(FrameOutcome {
            faces,
            overlays,
            blinked,
            recording: self.session.recording().is_active(),
            recorded: writes.recorded,
            failed: writes.failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FaceLocation;

    #[test]
    fn test_upscale_is_inverse_of_downscale() {
        let config = PipelineConfig::default();
        assert_eq!(config.upscale(), 4.0);
        assert_eq!(config.matcher_config().upscale, 4.0);

        let half = PipelineConfig {
            downscale: 0.5,
            ..PipelineConfig::default()
        };
        assert_eq!(half.upscale(), 2.0);

        let full = PipelineConfig {
            downscale: 1.0,
            ..PipelineConfig::default()
        };
        assert_eq!(full.upscale(), 1.0);
    }

    #[test]
    fn test_fractional_downscale_maps_back_to_frame_edge() {
        let config = PipelineConfig {
            downscale: 0.3,
            ..PipelineConfig::default()
        };
        let frame = RgbImage::new(640, 480);
        let small = downscale(&frame, config.downscale);
        assert_eq!(small.dimensions(), (192, 144));

        let edge = FaceLocation::new(0, small.width() - 1, small.height() - 1, 0);
        let full = edge.scaled(config.matcher_config().upscale);
        assert_eq!(full.right, 637);
        assert_eq!(full.bottom, 477);
    }

    #[test]
    fn test_downscale_quarter() {
        let frame = RgbImage::new(640, 480);
        let small = downscale(&frame, 0.25);
        assert_eq!(small.dimensions(), (160, 120));
        assert!(matches!(small, Cow::Owned(_)));
    }

    #[test]
    fn test_downscale_identity_borrows() {
        let frame = RgbImage::new(64, 48);
        assert!(matches!(downscale(&frame, 1.0), Cow::Borrowed(_)));
        assert!(matches!(downscale(&frame, 0.0), Cow::Borrowed(_)));
    }
}
