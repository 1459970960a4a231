//! Line segment detection by gradient-orientation region growing.
//!
//! Pixels with a strong Sobel response are grouped into regions whose gradient
//! orientation (folded modulo π) stays within a tolerance of the region's mean
//! orientation, which is updated as pixels join. Each accepted region is fitted
//! with a line by PCA and clipped to the extent of its pixels along the line
//! tangent.

use edgerefine_core::{GrayImage, Image, LineSegment, Roi};
use nalgebra::{Matrix2, SymmetricEigen};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

const NEIGH_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Minimum number of pixels in a region.
const MIN_REGION_PIXELS: usize = 12;

/// Options controlling region growth in the segment detector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LsdOptions {
    /// Minimum Sobel magnitude of region pixels, on intensities scaled to `[0, 1]`.
    pub magnitude_threshold: f32,
    /// Orientation tolerance around the seed orientation, in degrees.
    pub angle_tolerance_deg: f32,
    /// Minimum accepted segment length in pixels.
    pub min_length_px: f32,
    /// Minimum share of region pixels within half the tolerance of the seed.
    pub min_aligned_fraction: f32,
}

impl Default for LsdOptions {
    fn default() -> Self {
        Self {
            magnitude_threshold: 0.2,
            angle_tolerance_deg: 22.5,
            min_length_px: 8.0,
            min_aligned_fraction: 0.6,
        }
    }
}

/// Extracts line segments from an 8-bit image region.
pub trait SegmentDetector {
    /// Segments found inside `roi`, in full-image pixel coordinates.
    fn detect(&self, image: &GrayImage, roi: &Roi) -> Vec<LineSegment>;
}

#[derive(Debug, Clone, Default)]
pub struct LineSegmentDetector {
    pub options: LsdOptions,
}

impl LineSegmentDetector {
    pub fn new(options: LsdOptions) -> Self {
        Self { options }
    }
}

impl SegmentDetector for LineSegmentDetector {
    fn detect(&self, image: &GrayImage, roi: &Roi) -> Vec<LineSegment> {
        if roi.is_empty() {
            return Vec::new();
        }
        let crop = image.crop(roi).map(|v| v as f32 / 255.0);
        RegionGrower::new(&crop, &self.options)
            .extract()
            .into_iter()
            .map(|s| s.offset(roi.x as f64, roi.y as f64))
            .collect()
    }
}

struct Gradients {
    gx: Vec<f32>,
    gy: Vec<f32>,
    mag: Vec<f32>,
}

/// 3×3 Sobel with border clamping.
fn sobel(img: &Image<f32>) -> Gradients {
    let (w, h) = (img.width, img.height);
    let mut g = Gradients {
        gx: vec![0.0; w * h],
        gy: vec![0.0; w * h],
        mag: vec![0.0; w * h],
    };
    for y in 0..h {
        let ys = [y.saturating_sub(1), y, (y + 1).min(h - 1)];
        for x in 0..w {
            let xs = [x.saturating_sub(1), x, (x + 1).min(w - 1)];
            let p = |i: usize, j: usize| img.get(xs[j], ys[i]);
            let gx = (p(0, 2) + 2.0 * p(1, 2) + p(2, 2)) - (p(0, 0) + 2.0 * p(1, 0) + p(2, 0));
            let gy = (p(2, 0) + 2.0 * p(2, 1) + p(2, 2)) - (p(0, 0) + 2.0 * p(0, 1) + p(0, 2));
            let idx = y * w + x;
            g.gx[idx] = gx;
            g.gy[idx] = gy;
            g.mag[idx] = (gx * gx + gy * gy).sqrt();
        }
    }
    g
}

/// Orientation folded into `[0, π)`.
#[inline]
fn fold_half_pi(angle: f32) -> f32 {
    let a = angle.rem_euclid(PI);
    if a >= PI - 1e-6 {
        0.0
    } else {
        a
    }
}

/// Unsigned difference of two π-periodic orientations, in `[0, π/2]`.
#[inline]
fn orientation_difference(a: f32, b: f32) -> f32 {
    let d = (a - b).abs().rem_euclid(PI);
    if d > FRAC_PI_2 {
        PI - d
    } else {
        d
    }
}

#[derive(Default)]
struct Region {
    indices: Vec<usize>,
    sum_x: f64,
    sum_y: f64,
    sum_xx: f64,
    sum_yy: f64,
    sum_xy: f64,
    /// Doubled-angle sums for the π-periodic mean orientation.
    sum_cos2: f32,
    sum_sin2: f32,
    aligned: usize,
}

impl Region {
    fn clear(&mut self) {
        self.indices.clear();
        self.sum_x = 0.0;
        self.sum_y = 0.0;
        self.sum_xx = 0.0;
        self.sum_yy = 0.0;
        self.sum_xy = 0.0;
        self.sum_cos2 = 0.0;
        self.sum_sin2 = 0.0;
        self.aligned = 0;
    }

    fn add_orientation(&mut self, angle: f32) {
        self.sum_cos2 += (2.0 * angle).cos();
        self.sum_sin2 += (2.0 * angle).sin();
    }

    /// Mean orientation of the pixels added so far, in `[0, π)`.
    fn orientation(&self) -> f32 {
        fold_half_pi(0.5 * self.sum_sin2.atan2(self.sum_cos2))
    }

    fn push(&mut self, idx: usize, x: usize, y: usize, aligned: bool) {
        self.indices.push(idx);
        let (xf, yf) = (x as f64, y as f64);
        self.sum_x += xf;
        self.sum_y += yf;
        self.sum_xx += xf * xf;
        self.sum_yy += yf * yf;
        self.sum_xy += xf * yf;
        if aligned {
            self.aligned += 1;
        }
    }

    fn aligned_fraction(&self) -> f32 {
        if self.indices.is_empty() {
            0.0
        } else {
            self.aligned as f32 / self.indices.len() as f32
        }
    }
}

struct RegionGrower {
    grad: Gradients,
    angle: Vec<f32>,
    width: usize,
    height: usize,
    mag_thresh: f32,
    angle_tol: f32,
    min_len: f64,
    min_aligned: f32,
    used: Vec<bool>,
    stack: Vec<usize>,
    region: Region,
    segments: Vec<LineSegment>,
}

impl RegionGrower {
    fn new(img: &Image<f32>, options: &LsdOptions) -> Self {
        let grad = sobel(img);
        let angle = grad
            .gy
            .iter()
            .zip(&grad.gx)
            .map(|(gy, gx)| fold_half_pi(gy.atan2(*gx)))
            .collect();
        let n = img.width * img.height;
        Self {
            grad,
            angle,
            width: img.width,
            height: img.height,
            mag_thresh: options.magnitude_threshold,
            angle_tol: options.angle_tolerance_deg.to_radians(),
            min_len: options.min_length_px as f64,
            min_aligned: options.min_aligned_fraction,
            used: vec![false; n],
            stack: Vec::with_capacity(64),
            region: Region::default(),
            segments: Vec::new(),
        }
    }

    fn extract(mut self) -> Vec<LineSegment> {
        for idx in 0..self.width * self.height {
            if self.used[idx] || self.grad.mag[idx] < self.mag_thresh {
                continue;
            }
            self.region.clear();
            self.used[idx] = true;
            self.stack.push(idx);
            self.region.add_orientation(self.angle[idx]);
            self.grow();
            match self.fit() {
                Some(seg) => self.segments.push(seg),
                None => {
                    for &i in &self.region.indices {
                        self.used[i] = false;
                    }
                }
            }
        }
        self.segments
    }

    fn grow(&mut self) {
        let half_tol = 0.5 * self.angle_tol;
        while let Some(idx) = self.stack.pop() {
            let (x, y) = (idx % self.width, idx / self.width);
            let aligned =
                orientation_difference(self.angle[idx], self.region.orientation()) <= half_tol;
            self.region.push(idx, x, y, aligned);

            for (dx, dy) in NEIGH_OFFSETS {
                let xn = x as isize + dx;
                let yn = y as isize + dy;
                if xn < 0 || yn < 0 || xn >= self.width as isize || yn >= self.height as isize {
                    continue;
                }
                let n_idx = yn as usize * self.width + xn as usize;
                if self.used[n_idx] || self.grad.mag[n_idx] < self.mag_thresh {
                    continue;
                }
                let angle = self.angle[n_idx];
                if orientation_difference(angle, self.region.orientation()) <= self.angle_tol {
                    self.used[n_idx] = true;
                    self.stack.push(n_idx);
                    self.region.add_orientation(angle);
                }
            }
        }
    }

    fn fit(&self) -> Option<LineSegment> {
        let region = &self.region;
        if region.indices.len() < MIN_REGION_PIXELS || region.aligned_fraction() < self.min_aligned
        {
            return None;
        }
        let count = region.indices.len() as f64;
        let cx = region.sum_x / count;
        let cy = region.sum_y / count;
        let cxx = region.sum_xx / count - cx * cx;
        let cyy = region.sum_yy / count - cy * cy;
        let cxy = region.sum_xy / count - cx * cy;
        let eig = SymmetricEigen::new(Matrix2::new(cxx, cxy, cxy, cyy));
        let major = if eig.eigenvalues[0] >= eig.eigenvalues[1] { 0 } else { 1 };
        if !eig.eigenvalues[major].is_finite() || eig.eigenvalues[major] <= 0.0 {
            return None;
        }
        let t = eig.eigenvectors.column(major).into_owned();
        let norm = t.norm();
        if !norm.is_finite() || norm < 1e-9 {
            return None;
        }
        let (tx, ty) = (t[0] / norm, t[1] / norm);

        let (mut smin, mut smax) = (f64::INFINITY, f64::NEG_INFINITY);
        for &idx in &region.indices {
            let dx = (idx % self.width) as f64 - cx;
            let dy = (idx / self.width) as f64 - cy;
            let s = dx * tx + dy * ty;
            smin = smin.min(s);
            smax = smax.max(s);
        }
        let len = smax - smin;
        if !len.is_finite() || len < self.min_len {
            return None;
        }
        Some(LineSegment::new(
            cx + smin * tx,
            cy + smin * ty,
            cx + smax * tx,
            cy + smax * ty,
        ))
    }
}
