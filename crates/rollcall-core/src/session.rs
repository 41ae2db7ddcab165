//! Recording gate between matching and persistence.

use crate::backend::{AttendanceBackend, BackendError, RecordOutcome};
use crate::matcher::FaceMatch;
use crate::overlay::FaceStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

/// One-way recording switch. Starts `Idle`; once `Active` it stays so for
/// the rest of the run.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    state: SessionState,
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin recording. Returns true if this call changed the state.
    pub fn start(&mut self) -> bool {
        let changed = self.state == SessionState::Idle;
        self.state = SessionState::Active;
        changed
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}

/// Whether a blink is required before a match is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessPolicy {
    #[default]
    Required,
    Disabled,
}

/// A name the session handed to the backend this frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub name: String,
    pub outcome: RecordOutcome,
}

/// A write the backend refused. The rest of the frame is unaffected.
#[derive(Debug)]
pub struct WriteFailure {
    pub name: String,
    pub error: BackendError,
}

/// Every backend call made for one frame, split by result.
#[derive(Debug, Default)]
pub struct FrameWrites {
    pub recorded: Vec<Recorded>,
    pub failed: Vec<WriteFailure>,
}

pub struct AttendanceSession {
    recording: RecordingSession,
    policy: LivenessPolicy,
}

impl AttendanceSession {
    pub fn new(policy: LivenessPolicy) -> Self {
        Self {
            recording: RecordingSession::new(),
            policy,
        }
    }

    pub fn policy(&self) -> LivenessPolicy {
        self.policy
    }

    pub fn recording(&self) -> &RecordingSession {
        &self.recording
    }

    pub fn start(&mut self) -> bool {
        let changed = self.recording.start();
        if changed {
            tracing::info!("attendance recording started");
        }
        changed
    }

    fn live_enough(&self, blinked: bool) -> bool {
        match self.policy {
            LivenessPolicy::Required => blinked,
            LivenessPolicy::Disabled => true,
        }
    }

    /// Whether this face, in this frame, is persisted.
    pub fn should_record(&self, face: &FaceMatch, blinked: bool) -> bool {
        self.recording.is_active() && face.confirmed && self.live_enough(blinked)
    }

    /// How a face is presented. Independent of the recording state.
    pub fn display_status(&self, face: &FaceMatch, blinked: bool) -> FaceStatus {
        if !face.confirmed {
            FaceStatus::Unknown
        } else if self.live_enough(blinked) {
            FaceStatus::Confirmed
        } else {
            FaceStatus::AwaitingBlink
        }
    }

    /// Hand every qualifying face of one frame to the backend. A failed
    /// write is collected and the remaining faces are still attempted.
    pub fn process(
        &mut self,
        backend: &mut dyn AttendanceBackend,
        faces: &[FaceMatch],
        blinked: bool,
        timestamp: &str,
    ) -> FrameWrites {
        let mut writes = FrameWrites::default();
        for face in faces {
            if !self.should_record(face, blinked) {
                continue;
            }
            let Some(name) = face.name() else {
                continue;
            };
            match backend.record_if_absent(&name, timestamp) {
                Ok(outcome) => {
                    match outcome {
                        RecordOutcome::Inserted => {
                            tracing::info!(name = %name, timestamp, "attendance recorded");
                        }
                        RecordOutcome::AlreadyPresent => {
                            tracing::debug!(name = %name, "attendance already recorded");
                        }
                    }
                    writes.recorded.push(Recorded { name, outcome });
                }
                Err(error) => {
                    tracing::error!(name = %name, error = %error, "attendance write failed");
                    writes.failed.push(WriteFailure { name, error });
                }
            }
        }
        writes
    }
}
