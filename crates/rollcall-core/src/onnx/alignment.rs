//! Five-point similarity alignment of RGB face crops.

use crate::types::Point;
use image::{Rgb, RgbImage};

/// Canonical landmark positions in a 112×112 recognizer input.
pub const REFERENCE_LANDMARKS_112: [Point; 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Rotation-scale-translation `x' = a·x − b·y + tx`, `y' = b·x + a·y + ty`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    pub fn apply(&self, (x, y): Point) -> Point {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Inverse transform, or `None` when the scale has collapsed.
    pub fn inverse(&self) -> Option<Similarity> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let a = self.a / det;
        let b = -self.b / det;
        Some(Similarity {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Closed-form least-squares similarity taking `src` onto `dst`.
pub fn estimate_similarity(src: &[Point; 5], dst: &[Point; 5]) -> Similarity {
    let n = src.len() as f32;
    let centroid = |pts: &[Point; 5]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        (sx / n, sy / n)
    };
    let (scx, scy) = centroid(src);
    let (dcx, dcy) = centroid(dst);

    let mut dot = 0.0f32;
    let mut cross = 0.0f32;
    let mut norm = 0.0f32;
    for (s, d) in src.iter().zip(dst.iter()) {
        let (sx, sy) = (s.0 - scx, s.1 - scy);
        let (dx, dy) = (d.0 - dcx, d.1 - dcy);
        dot += sx * dx + sy * dy;
        cross += sx * dy - sy * dx;
        norm += sx * sx + sy * sy;
    }

    if norm < 1e-12 {
        return Similarity {
            a: 1.0,
            b: 0.0,
            tx: dcx - scx,
            ty: dcy - scy,
        };
    }

    let a = dot / norm;
    let b = cross / norm;
    Similarity {
        a,
        b,
        tx: dcx - (a * scx - b * scy),
        ty: dcy - (b * scx + a * scy),
    }
}

fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = image.dimensions();
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let at = |px: i64, py: i64, c: usize| -> f32 {
        if px >= 0 && py >= 0 && (px as u32) < w && (py as u32) < h {
            image.get_pixel(px as u32, py as u32)[c] as f32
        } else {
            0.0
        }
    };

    let mut out = [0u8; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        let v = at(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
            + at(x0 + 1, y0, c) * fx * (1.0 - fy)
            + at(x0, y0 + 1, c) * (1.0 - fx) * fy
            + at(x0 + 1, y0 + 1, c) * fx * fy;
        *slot = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Warp the face described by `keypoints` into a canonical 112×112 crop.
///
/// Pixels that map outside the source are black.
pub fn align_face(image: &RgbImage, keypoints: &[Point; 5]) -> RgbImage {
    let forward = estimate_similarity(keypoints, &REFERENCE_LANDMARKS_112);
    let mut out = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    let Some(backward) = forward.inverse() else {
        return out;
    };
    for (ox, oy, pixel) in out.enumerate_pixels_mut() {
        let (sx, sy) = backward.apply((ox as f32, oy as f32));
        *pixel = sample_bilinear(image, sx, sy);
    }
    out
}
