//! Owned row-major image buffers.
//!
//! All buffers store `width * height` samples with `(x, y)` addressing,
//! `x` along columns and `y` along rows.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Label stored in an [`EdgeIdImage`] where no observed edge passes.
pub const EDGE_BACKGROUND: i32 = -1;

/// Dense single-channel image.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    pub width: usize,
    pub height: usize,
    pub data: Vec<T>,
}

/// Metric depth in meters; non-finite or non-positive values are holes.
pub type DepthImage = Image<f32>;
/// 8-bit grayscale image.
pub type GrayImage = Image<u8>;
/// Per-pixel observed edge index, [`EDGE_BACKGROUND`] where empty.
pub type EdgeIdImage = Image<i32>;

impl<T: Copy> Image<T> {
    /// Image filled with a constant value.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wrap an existing buffer, checking its length.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Result<Self> {
        ensure!(
            data.len() == width * height,
            "buffer length {} does not match {}x{}",
            data.len(),
            width,
            height
        );
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    /// Bounds-checked access with signed coordinates.
    #[inline]
    pub fn try_get(&self, x: i64, y: i64) -> Option<T> {
        if self.contains(x, y) {
            Some(self.data[y as usize * self.width + x as usize])
        } else {
            None
        }
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let w = self.width;
        self.data[y * w + x] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Copy of the pixels inside `roi`. The ROI must lie within the image.
    pub fn crop(&self, roi: &Roi) -> Self {
        let mut data = Vec::with_capacity(roi.width * roi.height);
        for y in roi.y..roi.y + roi.height {
            let start = y * self.width + roi.x;
            data.extend_from_slice(&self.data[start..start + roi.width]);
        }
        Self {
            width: roi.width,
            height: roi.height,
            data,
        }
    }

    /// Per-pixel map into a new image of the same size.
    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Image<U> {
        Image {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }
}

impl DepthImage {
    /// Whether a depth sample is usable (finite and positive).
    #[inline]
    pub fn is_valid_depth(d: f32) -> bool {
        d.is_finite() && d > 0.0
    }
}

/// Axis-aligned pixel rectangle `[x, x + width) × [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Roi {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Bounding box of pixels with depth `> 0`, padded by `padding` on every side
/// and clipped to the image. Returns `None` when no pixel has positive depth.
pub fn depth_bounding_roi(depth: &DepthImage, padding: usize) -> Option<Roi> {
    let mut min_x = usize::MAX;
    let mut min_y = usize::MAX;
    let mut max_x = 0usize;
    let mut max_y = 0usize;
    let mut any = false;
    for y in 0..depth.height {
        for (x, &d) in depth.row(y).iter().enumerate() {
            if DepthImage::is_valid_depth(d) {
                any = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }
    if !any {
        return None;
    }
    let x0 = min_x.saturating_sub(padding);
    let y0 = min_y.saturating_sub(padding);
    let x1 = (max_x + padding).min(depth.width - 1);
    let y1 = (max_y + padding).min(depth.height - 1);
    Some(Roi {
        x: x0,
        y: y0,
        width: x1 - x0 + 1,
        height: y1 - y0 + 1,
    })
}

/// Min-max normalize finite depth values to `0..=255`.
///
/// The minimum and maximum run over the whole image, holes included as zero,
/// so the background maps to black. A constant image maps to zero.
pub fn normalize_min_max_u8(depth: &DepthImage) -> GrayImage {
    let value = |d: f32| if d.is_finite() { d } else { 0.0 };
    let (lo, hi) = depth
        .data
        .iter()
        .map(|&d| value(d))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), d| {
            (lo.min(d), hi.max(d))
        });
    let range = hi - lo;
    if !range.is_finite() || range <= 0.0 {
        return GrayImage::filled(depth.width, depth.height, 0);
    }
    depth.map(|d| ((value(d) - lo) / range * 255.0).round().clamp(0.0, 255.0) as u8)
}
