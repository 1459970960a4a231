//! 2D line segments and edge-id rasterization.

use crate::{EdgeIdImage, Real, Vec2};
use serde::{Deserialize, Serialize};

/// Straight image-space segment from `(x1, y1)` to `(x2, y2)` in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub x1: Real,
    pub y1: Real,
    pub x2: Real,
    pub y2: Real,
}

impl LineSegment {
    pub fn new(x1: Real, y1: Real, x2: Real, y2: Real) -> Self {
        Self { x1, y1, x2, y2 }
    }

    #[inline]
    pub fn start(&self) -> Vec2 {
        Vec2::new(self.x1, self.y1)
    }

    #[inline]
    pub fn end(&self) -> Vec2 {
        Vec2::new(self.x2, self.y2)
    }

    pub fn length(&self) -> Real {
        (self.start() - self.end()).norm()
    }

    /// Unnormalized vector from the end point back to the start point.
    #[inline]
    pub fn reverse_direction(&self) -> Vec2 {
        self.start() - self.end()
    }

    /// Unit normal: the normalized `start - end` direction rotated by 90°.
    ///
    /// Degenerate (zero-length) segments yield a zero vector.
    pub fn normal(&self) -> Vec2 {
        let v = self.reverse_direction();
        let len = v.norm();
        if len <= Real::EPSILON {
            return Vec2::zeros();
        }
        let v = v / len;
        Vec2::new(-v.y, v.x)
    }

    /// Segment translated by `(dx, dy)`.
    pub fn offset(&self, dx: Real, dy: Real) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }
}

/// Rasterize segments into `labels`, writing the segment index along each line.
///
/// Endpoints are rounded to the nearest pixel and lines are traced with
/// Bresenham's algorithm. Later segments overwrite earlier ones; pixels
/// outside the image are skipped.
pub fn draw_edge_ids(labels: &mut EdgeIdImage, edges: &[LineSegment]) {
    for (id, seg) in edges.iter().enumerate() {
        let id = id as i32;
        trace_line(
            seg.x1.round() as i64,
            seg.y1.round() as i64,
            seg.x2.round() as i64,
            seg.y2.round() as i64,
            |x, y| {
                if labels.contains(x, y) {
                    labels.set(x as usize, y as usize, id);
                }
            },
        );
    }
}

/// Bresenham line walk visiting every pixel from `(x0, y0)` to `(x1, y1)` inclusive.
pub fn trace_line(x0: i64, y0: i64, x1: i64, y1: i64, mut visit: impl FnMut(i64, i64)) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    loop {
        visit(x, y);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
