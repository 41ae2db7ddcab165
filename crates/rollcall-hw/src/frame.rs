//! Frame type and pixel conversion: packed YUYV and MJPEG into RGB.

use image::{ImageFormat, RgbImage};

/// A captured colour camera frame at capture resolution.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("odd frame width {0} for YUYV")]
    OddWidth(u32),
    #[error("MJPEG decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// BT.601 limited-range YCbCr to RGB.
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let c = (y as f32 - 16.0) * 1.164;
    let d = cb as f32 - 128.0;
    let e = cr as f32 - 128.0;
    [
        clamp_u8(c + 1.596 * e),
        clamp_u8(c - 0.392 * d - 0.813 * e),
        clamp_u8(c + 2.017 * d),
    ]
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share
/// the chroma pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    if width % 2 != 0 {
        return Err(FrameError::OddWidth(width));
    }
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }

    // Length is exactly width * height * 3 by construction.
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

/// Decode one MJPEG buffer. Some webcams pad the buffer past the JPEG end
/// marker; the decoder ignores the tail.
pub fn mjpeg_to_rgb(jpeg: &[u8]) -> Result<RgbImage, FrameError> {
    let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?;
    Ok(decoded.to_rgb8())
}
