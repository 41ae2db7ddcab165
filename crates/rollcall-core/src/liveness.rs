//! Blink-based liveness via the eye aspect ratio (EAR).
//!
//! The EAR of an open eye is roughly constant and collapses towards zero
//! while the lids are closed. A blink is reported on the frame where the
//! ratio recovers after a long enough dip, never during the dip itself.
//!
//! One counter is shared by every face in the frame: two people in view
//! feed the same state, so one person's closed eyes can combine with the
//! other's open eyes. Per-identity tracking is not attempted.

use crate::types::{EyeLandmarks, Point};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EAR_THRESHOLD: f32 = 0.3;
pub const DEFAULT_CONSEC_FRAMES: u32 = 3;

fn dist(a: Point, b: Point) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// `(|p1-p5| + |p2-p4|) / (2 |p0-p3|)` for a six-point eye contour.
///
/// A contour with coincident corners has no width; it reports 0.0.
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> f32 {
    let vertical_a = dist(eye[1], eye[5]);
    let vertical_b = dist(eye[2], eye[4]);
    let horizontal = dist(eye[0], eye[3]);
    if horizontal > 0.0 {
        (vertical_a + vertical_b) / (2.0 * horizontal)
    } else {
        0.0
    }
}

/// Mean of the left and right eye aspect ratios.
pub fn average_ear(landmarks: &EyeLandmarks) -> f32 {
    (eye_aspect_ratio(&landmarks.left_eye) + eye_aspect_ratio(&landmarks.right_eye)) / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// EAR below this counts as a closed-eye frame.
    pub ear_threshold: f32,
    /// Closed-eye frames required before a recovery counts as a blink.
    pub consec_frames: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ear_threshold: DEFAULT_EAR_THRESHOLD,
            consec_frames: DEFAULT_CONSEC_FRAMES,
        }
    }
}

/// Mutable blink state carried from frame to frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessState {
    pub consecutive_low_ear_frames: u32,
    /// Whether the most recent frame confirmed a blink.
    pub blink_confirmed: bool,
}

/// Edge-triggered blink detector.
#[derive(Debug, Clone, Default)]
pub struct LivenessDetector {
    config: LivenessConfig,
    state: LivenessState,
}

impl LivenessDetector {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            config,
            state: LivenessState::default(),
        }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn state(&self) -> LivenessState {
        self.state
    }

    /// Feed one EAR sample. Returns true when this sample completes a blink.
    pub fn observe_ear(&mut self, ear: f32) -> bool {
        if ear < self.config.ear_threshold {
            self.state.consecutive_low_ear_frames += 1;
            false
        } else {
            let blinked = self.state.consecutive_low_ear_frames >= self.config.consec_frames;
            self.state.consecutive_low_ear_frames = 0;
            blinked
        }
    }

    /// Process every face's eye landmarks for one frame.
    ///
    /// Faces are fed in order into the shared counter; the frame counts as
    /// blinked if any of them completes a blink. With no landmarks at all
    /// the counter is left untouched.
    pub fn update(&mut self, faces: &[EyeLandmarks]) -> bool {
        let mut blinked = false;
        for landmarks in faces {
            let ear = average_ear(landmarks);
            if self.observe_ear(ear) {
                blinked = true;
            }
        }
        self.state.blink_confirmed = blinked;
        if blinked {
            tracing::debug!("blink confirmed");
        }
        blinked
    }
}
