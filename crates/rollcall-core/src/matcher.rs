//! Per-frame identity resolution.

use crate::analyzer::FaceAnalyzer;
use crate::store::EmbeddingStore;
use crate::types::{DetectedFace, Embedding, FaceLocation};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;
pub const DEFAULT_LIBRARY_TOLERANCE: f32 = 0.6;
pub const DEFAULT_UPSCALE: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Local acceptance bound; a candidate must be strictly closer than this.
    pub match_threshold: f32,
    /// Tolerance handed to the analyzer's own match predicate.
    pub library_tolerance: f32,
    /// Factor mapping downscaled boxes back to capture resolution.
    pub upscale: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            library_tolerance: DEFAULT_LIBRARY_TOLERANCE,
            upscale: DEFAULT_UPSCALE,
        }
    }
}

/// Who a face was resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Known(String),
    Unknown,
}

/// Resolution of one detected face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub identity: Identity,
    /// Distance to the nearest enrolled identity; `None` when nothing is enrolled.
    pub distance: Option<f32>,
    /// Box in capture-resolution coordinates.
    pub location: FaceLocation,
    pub confirmed: bool,
}

impl FaceMatch {
    /// Display and attendance name: the enrolled label upper-cased.
    pub fn name(&self) -> Option<String> {
        match &self.identity {
            Identity::Known(label) => Some(label.to_uppercase()),
            Identity::Unknown => None,
        }
    }
}

/// The analyzer's own verdict for the chosen candidate.
pub fn library_accepts(
    analyzer: &dyn FaceAnalyzer,
    known: &Embedding,
    probe: &Embedding,
    tolerance: f32,
) -> bool {
    analyzer.is_match(known, probe, tolerance)
}

/// The local distance gate. Strict: a distance equal to the threshold is rejected.
pub fn within_threshold(distance: f32, threshold: f32) -> bool {
    distance < threshold
}

pub struct FrameMatcher {
    config: MatcherConfig,
}

impl FrameMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Resolve a single face against the store.
    ///
    /// The arg-min candidate is accepted only when both the analyzer's match
    /// predicate and the local threshold agree.
    pub fn match_face(
        &self,
        analyzer: &dyn FaceAnalyzer,
        store: &EmbeddingStore,
        location: FaceLocation,
        embedding: &Embedding,
    ) -> FaceMatch {
        let location = location.scaled(self.config.upscale);

        let Some(nearest) = store.nearest_by(|known| analyzer.face_distance(known, embedding))
        else {
            return FaceMatch {
                identity: Identity::Unknown,
                distance: None,
                location,
                confirmed: false,
            };
        };

        let candidate = &store.identities()[nearest.index];
        let confirmed = library_accepts(
            analyzer,
            &candidate.embedding,
            embedding,
            self.config.library_tolerance,
        ) && within_threshold(nearest.distance, self.config.match_threshold);

        FaceMatch {
            identity: if confirmed {
                Identity::Known(candidate.label.clone())
            } else {
                Identity::Unknown
            },
            distance: Some(nearest.distance),
            location,
            confirmed,
        }
    }

    /// Resolve every face of a frame, preserving order.
    pub fn match_frame(
        &self,
        analyzer: &dyn FaceAnalyzer,
        store: &EmbeddingStore,
        faces: &[DetectedFace],
    ) -> Vec<FaceMatch> {
        faces
            .iter()
            .map(|face| self.match_face(analyzer, store, face.location, &face.embedding))
            .collect()
    }
}
