//! Enrolled identities and nearest-neighbour lookup.

use crate::analyzer::FaceAnalyzer;
use crate::types::{Embedding, KnownIdentity};
use image::RgbImage;
use std::path::Path;

/// File extensions accepted in the enrollment directory (matched case-insensitively).
pub const ENROLLMENT_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// A decoded enrollment photo and the label derived from its file name.
pub struct EnrollmentImage {
    pub label: String,
    pub image: RgbImage,
}

/// Read every supported image from `dir`, sorted by file name.
///
/// Unreadable files are skipped with a warning. A missing or unreadable
/// directory yields an empty set.
pub fn load_enrollment_dir(dir: &Path) -> Vec<EnrollmentImage> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot read enrollment directory");
            return Vec::new();
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_enrollment_extension(path))
        .collect();
    paths.sort();

    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(label) = path.file_stem().and_then(|s| s.to_str()) else {
            tracing::warn!(path = %path.display(), "enrollment file name is not valid UTF-8; skipping");
            continue;
        };
        match image::open(&path) {
            Ok(img) => images.push(EnrollmentImage {
                label: label.to_string(),
                image: img.to_rgb8(),
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read image file; skipping");
            }
        }
    }

    images
}

fn has_enrollment_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            ENROLLMENT_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Index and distance of the closest enrolled identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    pub index: usize,
    pub distance: f32,
}

/// Result of looking a probe up in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreMatch {
    Known { label: String, distance: f32 },
    Unknown,
}

/// Immutable set of enrolled identities, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingStore {
    identities: Vec<KnownIdentity>,
}

impl EmbeddingStore {
    pub fn from_identities(identities: Vec<KnownIdentity>) -> Self {
        Self { identities }
    }

    /// Describe each enrollment photo with the analyzer.
    ///
    /// The first face the analyzer reports wins when a photo holds several.
    /// Photos with no detectable face, or that fail analysis, are skipped
    /// with a warning.
    pub fn build(analyzer: &mut dyn FaceAnalyzer, images: Vec<EnrollmentImage>) -> Self {
        let mut identities = Vec::with_capacity(images.len());

        for EnrollmentImage { label, image } in images {
            let embedding = analyzer
                .face_locations(&image)
                .and_then(|locations| analyzer.face_encodings(&image, &locations));

            match embedding {
                Ok(embeddings) => match embeddings.into_iter().next() {
                    Some(embedding) => {
                        tracing::debug!(label = %label, "enrolled face");
                        identities.push(KnownIdentity { label, embedding });
                    }
                    None => {
                        tracing::warn!(label = %label, "no face found in enrollment image; skipping");
                    }
                },
                Err(e) => {
                    tracing::warn!(label = %label, error = %e, "failed to encode enrollment image; skipping");
                }
            }
        }

        tracing::info!(identities = identities.len(), "embedding store built");
        Self { identities }
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn identities(&self) -> &[KnownIdentity] {
        &self.identities
    }

    pub fn get(&self, index: usize) -> Option<&KnownIdentity> {
        self.identities.get(index)
    }

    /// Arg-min over every enrolled identity under `distance`.
    ///
    /// Ties resolve to the earliest identity. `None` for an empty store.
    pub fn nearest_by<F>(&self, mut distance: F) -> Option<Nearest>
    where
        F: FnMut(&Embedding) -> f32,
    {
        let mut best: Option<Nearest> = None;
        for (index, identity) in self.identities.iter().enumerate() {
            let d = distance(&identity.embedding);
            if best.map_or(true, |b| d < b.distance) {
                best = Some(Nearest { index, distance: d });
            }
        }
        best
    }

    /// Closest identity by Euclidean distance, or `Unknown` when nothing is enrolled.
    pub fn match_embedding(&self, probe: &Embedding) -> StoreMatch {
        match self.nearest_by(|known| known.euclidean_distance(probe)) {
            Some(Nearest { index, distance }) => StoreMatch::Known {
                label: self.identities[index].label.clone(),
                distance,
            },
            None => StoreMatch::Unknown,
        }
    }
}
