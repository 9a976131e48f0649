//! Perspective transform support for the streaming camera.
//!
//! A `Homography` is the fixed 3x3 projective map computed once from four
//! source/destination point correspondences. The solver is a plain 8x8
//! Gaussian elimination, so the same four points always produce the same
//! matrix and the same warped output.

use anyhow::{anyhow, Result};

use crate::frame::{Frame, PixelFormat};

/// A point in pixel coordinates.
pub type Point = (f32, f32);

/// 3x3 projective transform, row-major, normalized so `m[2][2] == 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    m: [[f64; 3]; 3],
}

impl Homography {
    /// Solve for the homography mapping each `src[i]` onto `dst[i]`.
    ///
    /// Fails when the correspondences are degenerate (three collinear
    /// points, repeated points).
    pub fn from_quad(src: [Point; 4], dst: [Point; 4]) -> Result<Self> {
        // Two equations per correspondence, unknowns [a b c d e f g h].
        let mut rows = [[0f64; 9]; 8];
        for (i, (&(x, y), &(u, v))) in src.iter().zip(dst.iter()).enumerate() {
            let (x, y, u, v) = (x as f64, y as f64, u as f64, v as f64);
            rows[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -x * u, -y * u, u];
            rows[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -x * v, -y * v, v];
        }

        let h = solve_8x8(&mut rows)?;
        Ok(Self {
            m: [
                [h[0], h[1], h[2]],
                [h[3], h[4], h[5]],
                [h[6], h[7], 1.0],
            ],
        })
    }

    /// Homography mapping the quad `src` onto the full `width` x `height`
    /// output rectangle, corners ordered top-left, top-right, bottom-left,
    /// bottom-right.
    pub fn quad_to_rect(src: [Point; 4], width: u32, height: u32) -> Result<Self> {
        let (w, h) = (width as f32, height as f32);
        Self::from_quad(src, [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)])
    }

    /// Apply the transform to a point.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.m;
        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        (
            (m[0][0] * x + m[0][1] * y + m[0][2]) / w,
            (m[1][0] * x + m[1][1] * y + m[1][2]) / w,
        )
    }

    /// Inverse transform, used by the warp to map output pixels back onto
    /// the source image.
    pub fn inverse(&self) -> Result<Self> {
        let m = &self.m;
        let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
        if det.abs() < 1e-12 {
            return Err(anyhow!("homography is singular"));
        }
        let inv = |r1: usize, c1: usize, r2: usize, c2: usize| {
            m[r1][c1] * m[r2][c2] - m[r1][c2] * m[r2][c1]
        };
        let adj = [
            [inv(1, 1, 2, 2), -inv(0, 1, 2, 2), inv(0, 1, 1, 2)],
            [-inv(1, 0, 2, 2), inv(0, 0, 2, 2), -inv(0, 0, 1, 2)],
            [inv(1, 0, 2, 1), -inv(0, 0, 2, 1), inv(0, 0, 1, 1)],
        ];
        let scale = adj[2][2] / det;
        if scale.abs() < 1e-12 {
            return Err(anyhow!("homography inverse cannot be normalized"));
        }
        let mut out = [[0f64; 3]; 3];
        for (r, row) in adj.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                out[r][c] = value / det / scale;
            }
        }
        Ok(Self { m: out })
    }
}

/// Warp an RGB24 frame through `transform` into a `width` x `height` output.
/// Output pixels with no source counterpart are black. Nearest-neighbor
/// sampling keeps the operation exactly reproducible.
pub fn warp_perspective(frame: &Frame, transform: &Homography, width: u32, height: u32) -> Result<Frame> {
    let inverse = transform.inverse()?;
    let bpp = PixelFormat::Rgb24.bytes_per_pixel();
    let mut out = vec![0u8; width as usize * height as usize * bpp];

    for y in 0..height {
        for x in 0..width {
            let (sx, sy) = inverse.apply(x as f64, y as f64);
            let sx = sx.round();
            let sy = sy.round();
            if !sx.is_finite() || !sy.is_finite() {
                continue;
            }
            if sx < 0.0 || sy < 0.0 || sx >= frame.width as f64 || sy >= frame.height as f64 {
                continue;
            }
            let src = (sy as usize * frame.width as usize + sx as usize) * bpp;
            let dst = (y as usize * width as usize + x as usize) * bpp;
            out[dst..dst + bpp].copy_from_slice(&frame.data[src..src + bpp]);
        }
    }

    Frame::rgb24(out, width, height)
}

/// Gaussian elimination with partial pivoting on an 8x8 system with an
/// augmented column.
fn solve_8x8(rows: &mut [[f64; 9]; 8]) -> Result<[f64; 8]> {
    for col in 0..8 {
        let pivot = (col..8)
            .max_by(|&a, &b| {
                rows[a][col]
                    .abs()
                    .partial_cmp(&rows[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| anyhow!("empty pivot search"))?;
        if rows[pivot][col].abs() < 1e-10 {
            return Err(anyhow!("degenerate point correspondences"));
        }
        rows.swap(col, pivot);

        let lead = rows[col][col];
        for c in col..9 {
            rows[col][c] /= lead;
        }
        for r in 0..8 {
            if r == col {
                continue;
            }
            let factor = rows[r][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..9 {
                rows[r][c] -= factor * rows[col][c];
            }
        }
    }

    let mut out = [0f64; 8];
    for (i, row) in rows.iter().enumerate() {
        out[i] = row[8];
    }
    Ok(out)
}
