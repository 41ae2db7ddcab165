//! Presentation of each processed frame: overlays drawn onto the frame,
//! an optional JPEG preview on disk, and log lines when what is on screen
//! changes.

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use rollcall_core::overlay::{self, FaceOverlay};
use rollcall_core::FrameOutcome;
use std::path::{Path, PathBuf};

pub struct Display {
    preview_path: Option<PathBuf>,
    last_summary: Option<String>,
}

/// One line describing the status and every face caption.
pub fn summarize(recording: bool, overlays: &[FaceOverlay]) -> String {
    let mut line = overlay::status_line(recording).to_string();
    for face in overlays {
        line.push_str(" | ");
        line.push_str(&face.caption);
        if let Some(prompt) = face.status.prompt() {
            line.push_str(" (");
            line.push_str(prompt);
            line.push(')');
        }
    }
    line
}

impl Display {
    pub fn new(preview_path: Option<PathBuf>) -> Self {
        Self {
            preview_path,
            last_summary: None,
        }
    }

    /// Annotate `frame` and publish it.
    pub fn show(&mut self, frame: &mut RgbImage, outcome: &FrameOutcome) -> Result<()> {
        overlay::draw_overlays(frame, &outcome.overlays);
        self.log_changes(summarize(outcome.recording, &outcome.overlays));

        for recorded in &outcome.recorded {
            if recorded.outcome == rollcall_core::RecordOutcome::Inserted {
                println!("Attendance recorded for: {}", recorded.name);
            }
        }
        for failure in &outcome.failed {
            eprintln!("Database error: {}", failure.error);
        }

        if let Some(path) = &self.preview_path {
            write_preview(frame, path)?;
        }
        Ok(())
    }

    /// Publish a frame with no analysis on it (enrollment preview).
    pub fn show_raw(&mut self, frame: &RgbImage) -> Result<()> {
        if let Some(path) = &self.preview_path {
            write_preview(frame, path)?;
        }
        Ok(())
    }

    fn log_changes(&mut self, summary: String) {
        if self.last_summary.as_deref() != Some(summary.as_str()) {
            tracing::info!(display = %summary, "display changed");
            self.last_summary = Some(summary);
        }
    }
}

/// Write to a sibling temp file and rename so viewers never see a partial JPEG.
fn write_preview(frame: &RgbImage, path: &Path) -> Result<()> {
    let tmp = path.with_extension("tmp.jpg");
    frame
        .save_with_format(&tmp, ImageFormat::Jpeg)
        .with_context(|| format!("failed to write preview {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to publish preview {}", path.display()))?;
    Ok(())
}
