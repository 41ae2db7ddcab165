//! Per-face annotations drawn on the capture-resolution frame.

use crate::types::FaceLocation;
use image::{Rgb, RgbImage};

const BOX_THICKNESS: u32 = 2;
const CAPTION_BAND_HEIGHT: u32 = 35;

pub const UNKNOWN_CAPTION: &str = "UNKNOWN";
pub const BLINK_PROMPT: &str = "BLINK TO CONFIRM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceStatus {
    /// Matched and live enough to be recorded.
    Confirmed,
    /// Matched, waiting on a blink.
    AwaitingBlink,
    Unknown,
}

impl FaceStatus {
    pub fn color(self) -> Rgb<u8> {
        match self {
            FaceStatus::Confirmed => Rgb([0, 255, 0]),
            FaceStatus::AwaitingBlink => Rgb([255, 165, 0]),
            FaceStatus::Unknown => Rgb([255, 0, 0]),
        }
    }

    /// Extra line shown above the box, if any.
    pub fn prompt(self) -> Option<&'static str> {
        match self {
            FaceStatus::AwaitingBlink => Some(BLINK_PROMPT),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceOverlay {
    pub location: FaceLocation,
    pub caption: String,
    pub status: FaceStatus,
}

pub fn status_line(recording: bool) -> &'static str {
    if recording {
        "Recording: ON"
    } else {
        "Recording: OFF"
    }
}

fn fill(image: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    for y in y0.min(h)..y1.min(h) {
        for x in x0.min(w)..x1.min(w) {
            image.put_pixel(x, y, color);
        }
    }
}

/// Outline each face and fill a caption band along its bottom edge.
pub fn draw_overlays(image: &mut RgbImage, overlays: &[FaceOverlay]) {
    for overlay in overlays {
        let FaceLocation {
            top,
            right,
            bottom,
            left,
        } = overlay.location;
        let color = overlay.status.color();
        let t = BOX_THICKNESS;

        fill(image, left, top, right + 1, top + t, color);
        fill(image, left, bottom.saturating_sub(t) + 1, right + 1, bottom + 1, color);
        fill(image, left, top, left + t, bottom + 1, color);
        fill(image, right.saturating_sub(t) + 1, top, right + 1, bottom + 1, color);

        let band_top = bottom.saturating_sub(CAPTION_BAND_HEIGHT).max(top);
        fill(image, left, band_top, right + 1, bottom + 1, color);
    }
}
