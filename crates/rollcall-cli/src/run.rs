//! `rollcall run`: the live attendance loop.

use crate::config::Config;
use crate::display::Display;
use crate::keys::{Command, KeyInput, POLL_TIMEOUT};
use anyhow::{Context, Result};
use rollcall_core::onnx::OnnxAnalyzer;
use rollcall_core::report::render_report;
use rollcall_core::store::load_enrollment_dir;
use rollcall_core::{EmbeddingStore, FramePipeline};
use rollcall_hw::{Camera, FrameSource};

pub fn print_help(liveness: bool) {
    println!("Press 's' to START attendance recording.");
    println!("Press 'q' to QUIT the program.");
    println!("Press 'r' for Report.");
    if liveness {
        println!("Liveness detection is ON.");
    } else {
        println!("Liveness detection is OFF.");
    }
}

pub fn run(config: &Config) -> Result<()> {
    let mut analyzer =
        OnnxAnalyzer::load(&config.model_paths()).context("failed to load face models")?;

    println!("Encoding registered faces...");
    let images = load_enrollment_dir(&config.images_dir);
    let store = EmbeddingStore::build(&mut analyzer, images);
    if store.is_empty() {
        println!(
            "No images found to encode. Please add a face image to the '{}' folder.",
            config.images_dir.display()
        );
    } else {
        println!("Encoding complete.");
    }

    let backend = config.open_backend()?;
    let mut pipeline = FramePipeline::new(
        config.pipeline_config(),
        Box::new(analyzer),
        store,
        backend,
    );

    let mut camera = match Camera::open(&config.camera_device) {
        Ok(camera) => camera,
        Err(e) => {
            eprintln!("Error: Could not open video stream.");
            return Err(e).with_context(|| format!("failed to open {}", config.camera_device));
        }
    };
    camera
        .discard_warmup(config.warmup_frames)
        .context("camera warmup failed")?;

    print_help(config.liveness);

    let mut keys =
        KeyInput::open(POLL_TIMEOUT).context("key commands need an interactive terminal")?;
    let mut display = Display::new(config.preview_path.clone());
    let frames = run_loop(&mut camera, &mut pipeline, &mut || keys.poll(), &mut display)?;

    tracing::info!(frames, "attendance loop finished; camera released");
    Ok(())
}

/// Capture, process, display and react to commands until `Quit`.
///
/// Returns the number of frames processed. A failed capture ends the loop
/// with an error. A frame that cannot be analyzed is shown without overlays;
/// failed writes are reported by the display and the loop carries on.
pub fn run_loop(
    source: &mut dyn FrameSource,
    pipeline: &mut FramePipeline,
    poll: &mut dyn FnMut() -> Option<Command>,
    display: &mut Display,
) -> Result<u64> {
    let mut frames = 0u64;
    loop {
        let frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                eprintln!("Error: Failed to capture frame from webcam. Exiting...");
                return Err(e).context("frame capture failed");
            }
        };
        let mut image = frame.image;

        match pipeline.process(&image) {
            Ok(outcome) => display.show(&mut image, &outcome)?,
            Err(e) => {
                tracing::warn!(error = %e, "frame analysis failed; skipping frame");
                display.show_raw(&image)?;
            }
        }
        frames += 1;

        while let Some(command) = poll() {
            match command {
                Command::StartRecording => {
                    if pipeline.start_recording() {
                        println!("Attendance recording started!");
                    }
                }
                Command::ShowReport => print_report(pipeline),
                Command::Quit => return Ok(frames),
                Command::Capture => {}
            }
        }
    }
}

fn print_report(pipeline: &FramePipeline) {
    match pipeline.backend().records() {
        Ok(records) => println!("\n{}", render_report(&records)),
        Err(e) => println!("\nDatabase error: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use rollcall_core::{
        AnalyzerError, AttendanceBackend, AttendanceRecord, BackendError, Embedding,
        EyeLandmarks, FaceAnalyzer, FaceLocation, KnownIdentity, LivenessPolicy, PipelineConfig,
        RecordOutcome, SqliteBackend,
    };
    use rollcall_hw::{CameraError, Frame};
    use std::collections::VecDeque;

    struct NoFaces;

    impl FaceAnalyzer for NoFaces {
        fn face_locations(&mut self, _: &RgbImage) -> Result<Vec<FaceLocation>, AnalyzerError> {
            Ok(Vec::new())
        }

        fn face_encodings(
            &mut self,
            _: &RgbImage,
            _: &[FaceLocation],
        ) -> Result<Vec<Embedding>, AnalyzerError> {
            Ok(Vec::new())
        }

        fn face_landmarks(
            &mut self,
            _: &RgbImage,
            _: &[FaceLocation],
        ) -> Result<Vec<Option<EyeLandmarks>>, AnalyzerError> {
            Ok(Vec::new())
        }
    }

    /// Yields `good` blank frames, then fails.
    struct FiniteSource {
        good: u32,
    }

    impl FrameSource for FiniteSource {
        fn read_frame(&mut self) -> Result<Frame, CameraError> {
            if self.good == 0 {
                return Err(CameraError::CaptureFailed("unplugged".into()));
            }
            self.good -= 1;
            Ok(Frame {
                image: RgbImage::new(64, 48),
                timestamp: std::time::Instant::now(),
                sequence: self.good,
            })
        }
    }

    fn pipeline() -> FramePipeline {
        FramePipeline::new(
            PipelineConfig::default(),
            Box::new(NoFaces),
            EmbeddingStore::default(),
            Box::new(SqliteBackend::open_in_memory().unwrap()),
        )
    }

    #[test]
    fn test_loop_runs_until_quit() {
        let mut pipeline = pipeline();
        // `None` ends the key batch for the current frame.
        let mut script = VecDeque::from(vec![
            None,
            Some(Command::StartRecording),
            Some(Command::ShowReport),
            None,
            None,
            Some(Command::Quit),
        ]);
        let mut poll = || script.pop_front().flatten();

        let frames = run_loop(
            &mut FiniteSource { good: 10 },
            &mut pipeline,
            &mut poll,
            &mut Display::new(None),
        )
        .unwrap();

        assert_eq!(frames, 4);
        assert!(pipeline.session().recording().is_active());
    }

    /// Every write fails.
    struct BrokenBackend;

    impl AttendanceBackend for BrokenBackend {
        fn record_if_absent(&mut self, _: &str, _: &str) -> Result<RecordOutcome, BackendError> {
            Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }

        fn records(&self) -> Result<Vec<AttendanceRecord>, BackendError> {
            Ok(Vec::new())
        }
    }

    /// One confirmed face per frame, eyes always open.
    struct AlwaysAlice;

    impl FaceAnalyzer for AlwaysAlice {
        fn face_locations(&mut self, _: &RgbImage) -> Result<Vec<FaceLocation>, AnalyzerError> {
            Ok(vec![FaceLocation::new(1, 5, 5, 1)])
        }

        fn face_encodings(
            &mut self,
            _: &RgbImage,
            locations: &[FaceLocation],
        ) -> Result<Vec<Embedding>, AnalyzerError> {
            Ok(locations.iter().map(|_| Embedding::new(vec![0.0; 4])).collect())
        }

        fn face_landmarks(
            &mut self,
            _: &RgbImage,
            locations: &[FaceLocation],
        ) -> Result<Vec<Option<EyeLandmarks>>, AnalyzerError> {
            Ok(locations.iter().map(|_| None).collect())
        }
    }

    #[test]
    fn test_storage_failure_does_not_end_loop() {
        let store = EmbeddingStore::from_identities(vec![KnownIdentity {
            label: "alice".into(),
            embedding: Embedding::new(vec![0.0; 4]),
        }]);
        let config = PipelineConfig {
            policy: LivenessPolicy::Disabled,
            ..PipelineConfig::default()
        };
        let mut pipeline =
            FramePipeline::new(config, Box::new(AlwaysAlice), store, Box::new(BrokenBackend));
        pipeline.start_recording();

        let dir = tempfile::tempdir().unwrap();
        let preview = dir.path().join("preview.jpg");
        let mut script = VecDeque::from(vec![None, None, Some(Command::Quit)]);
        let frames = run_loop(
            &mut FiniteSource { good: 10 },
            &mut pipeline,
            &mut || script.pop_front().flatten(),
            &mut Display::new(Some(preview.clone())),
        )
        .unwrap();
        assert_eq!(frames, 3);

        // Overlays are still drawn on frames whose write failed. The caption
        // band fills the whole 16px box at this size.
        let shown = image::open(&preview).unwrap().to_rgb8();
        let [r, g, b] = shown.get_pixel(12, 12).0;
        assert!(g > 200 && r < 60 && b < 60, "expected a green box, got {r},{g},{b}");
    }

    #[test]
    fn test_capture_failure_ends_loop_with_error() {
        let mut pipeline = pipeline();
        let err = run_loop(
            &mut FiniteSource { good: 2 },
            &mut pipeline,
            &mut || None,
            &mut Display::new(None),
        )
        .unwrap_err();
        assert!(err.to_string().contains("frame capture failed"));
        assert!(!pipeline.session().recording().is_active());
    }
}
