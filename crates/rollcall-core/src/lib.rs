//! rollcall-core — face-matched, blink-gated attendance.
//!
//! Fuses per-frame detector output (boxes, descriptors, eye landmarks) into
//! one decision per face, tracks blinks across frames, and persists at most
//! one attendance record per person once recording has been started.

pub mod analyzer;
pub mod backend;
pub mod liveness;
pub mod matcher;
pub mod onnx;
pub mod overlay;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod store;
pub mod types;

pub use analyzer::{AnalyzerError, FaceAnalyzer};
pub use backend::{AttendanceBackend, BackendError, FlatFileBackend, RecordOutcome, SqliteBackend};
pub use liveness::{LivenessConfig, LivenessDetector, LivenessState};
pub use matcher::{FaceMatch, FrameMatcher, Identity, MatcherConfig};
pub use pipeline::{FrameOutcome, FramePipeline, PipelineConfig, PipelineError};
pub use session::{
    AttendanceSession, FrameWrites, LivenessPolicy, Recorded, RecordingSession, SessionState,
    WriteFailure,
};
pub use store::{EmbeddingStore, StoreMatch};
pub use types::{AttendanceRecord, DetectedFace, Embedding, EyeLandmarks, FaceLocation, KnownIdentity};
