//! `rollcall enroll`: capture one photo per person into the enrollment directory.

use crate::config::Config;
use crate::display::Display;
use crate::keys::{Command, KeyInput, POLL_TIMEOUT};
use anyhow::{bail, Context, Result};
use image::ImageFormat;
use rollcall_hw::{Camera, FrameSource};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Reject labels that would escape the enrollment directory or be empty.
pub fn validate_label(raw: &str) -> Result<String> {
    let label = raw.trim();
    if label.is_empty() {
        bail!("label must not be empty");
    }
    if label.contains(['/', '\\']) || label == "." || label == ".." {
        bail!("label {label:?} must be a plain file name");
    }
    Ok(label.to_string())
}

pub fn photo_path(images_dir: &Path, label: &str) -> PathBuf {
    images_dir.join(format!("{label}.jpg"))
}

fn prompt_label(input: &mut impl BufRead) -> Result<String> {
    print!("Enter the name of the person: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    input.read_line(&mut line).context("failed to read label")?;
    validate_label(&line)
}

pub fn enroll(config: &Config, label: Option<String>) -> Result<()> {
    let label = match label {
        Some(label) => validate_label(&label)?,
        None => prompt_label(&mut std::io::stdin().lock())?,
    };
    let path = photo_path(&config.images_dir, &label);

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

    println!("Starting video capture. Look at the camera.");
    println!("Press 'c' to take a photo, 'q' to quit without saving.");

    let mut keys =
        KeyInput::open(POLL_TIMEOUT).context("key commands need an interactive terminal")?;
    let mut display = Display::new(config.preview_path.clone());
    match capture_loop(&mut camera, &mut || keys.poll(), &mut display, &path)? {
        Some(saved) => println!("Image saved successfully as {}", saved.display()),
        None => println!("Enrollment cancelled."),
    }
    Ok(())
}

/// Stream frames until `Capture` saves the latest one to `path`, or `Quit`.
pub fn capture_loop(
    source: &mut dyn FrameSource,
    poll: &mut dyn FnMut() -> Option<Command>,
    display: &mut Display,
    path: &Path,
) -> Result<Option<PathBuf>> {
    loop {
        let frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                eprintln!("Failed to capture a valid frame. Check your camera.");
                return Err(e).context("frame capture failed");
            }
        };
        display.show_raw(&frame.image)?;

        while let Some(command) = poll() {
            match command {
                Command::Capture => {
                    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        std::fs::create_dir_all(dir)
                            .with_context(|| format!("failed to create {}", dir.display()))?;
                    }
                    frame
                        .image
                        .save_with_format(path, ImageFormat::Jpeg)
                        .with_context(|| format!("failed to save {}", path.display()))?;
                    tracing::info!(path = %path.display(), "enrollment photo saved");
                    return Ok(Some(path.to_path_buf()));
                }
                Command::Quit => return Ok(None),
                Command::StartRecording | Command::ShowReport => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use rollcall_hw::{CameraError, Frame};
    use std::collections::VecDeque;

    struct SolidSource;

    impl FrameSource for SolidSource {
        fn read_frame(&mut self) -> Result<Frame, CameraError> {
            Ok(Frame {
                image: RgbImage::from_pixel(16, 12, image::Rgb([90, 120, 200])),
                timestamp: std::time::Instant::now(),
                sequence: 0,
            })
        }
    }

    #[test]
    fn test_validate_label() {
        assert_eq!(validate_label("  alice \n").unwrap(), "alice");
        assert!(validate_label("   ").is_err());
        assert!(validate_label("../etc/passwd").is_err());
        assert!(validate_label("..").is_err());
    }

    #[test]
    fn test_prompt_label_reads_one_line() {
        let mut input = std::io::Cursor::new("bob\nignored\n");
        assert_eq!(prompt_label(&mut input).unwrap(), "bob");
    }

    #[test]
    fn test_capture_saves_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = photo_path(&dir.path().join("images"), "carol");
        let mut script = VecDeque::from(vec![None, None, Some(Command::Capture)]);

        let saved = capture_loop(
            &mut SolidSource,
            &mut || script.pop_front().flatten(),
            &mut Display::new(None),
            &path,
        )
        .unwrap();

        assert_eq!(saved.as_deref(), Some(path.as_path()));
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (16, 12));
    }

    #[test]
    fn test_quit_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = photo_path(dir.path(), "dave");
        let mut script = VecDeque::from(vec![Some(Command::StartRecording), Some(Command::Quit)]);

        let saved = capture_loop(
            &mut SolidSource,
            &mut || script.pop_front().flatten(),
            &mut Display::new(None),
            &path,
        )
        .unwrap();

        assert!(saved.is_none());
        assert!(!path.exists());
    }
}
