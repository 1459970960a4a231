use crate::{Mat3, Pt3, Real, Vec2};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Minimum camera-frame depth accepted by [`PinholeIntrinsics::project`].
pub const MIN_PROJECTION_DEPTH: Real = 1e-9;

/// Pinhole intrinsics without skew or distortion.
///
/// Pixel coordinates follow the usual convention: `u = fx * x / z + cx`,
/// `v = fy * y / z + cy`, with integer values at pixel centers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeIntrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
}

impl PinholeIntrinsics {
    pub fn new(fx: Real, fy: Real, cx: Real, cy: Real) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Reject non-positive or non-finite focal lengths.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.fx.is_finite() && self.fy.is_finite() && self.fx > 0.0 && self.fy > 0.0,
            "focal lengths must be positive and finite (fx={}, fy={})",
            self.fx,
            self.fy
        );
        ensure!(
            self.cx.is_finite() && self.cy.is_finite(),
            "principal point must be finite"
        );
        Ok(())
    }

    /// Calibration matrix `K`.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Extract intrinsics from a 3×3 calibration matrix.
    ///
    /// Skew must be zero and the last row must be `[0 0 1]`.
    pub fn from_k_matrix(k: &Mat3) -> Result<Self> {
        ensure!(
            k[(0, 1)].abs() < 1e-9,
            "skewed intrinsics are not supported (K[0,1]={})",
            k[(0, 1)]
        );
        ensure!(
            k[(1, 0)].abs() < 1e-9
                && k[(2, 0)].abs() < 1e-9
                && k[(2, 1)].abs() < 1e-9
                && (k[(2, 2)] - 1.0).abs() < 1e-9,
            "malformed calibration matrix: {k}"
        );
        let intr = Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)]);
        intr.validate()?;
        Ok(intr)
    }

    /// Project a camera-frame point to pixel coordinates.
    ///
    /// Returns `None` for points at or behind the camera plane.
    pub fn project(&self, p_cam: &Pt3) -> Option<Vec2> {
        if p_cam.z <= MIN_PROJECTION_DEPTH {
            return None;
        }
        let inv_z = 1.0 / p_cam.z;
        Some(Vec2::new(
            self.fx * p_cam.x * inv_z + self.cx,
            self.fy * p_cam.y * inv_z + self.cy,
        ))
    }

    /// Back-project pixel `(u, v)` with metric `depth` to a camera-frame point.
    pub fn backproject(&self, u: Real, v: Real, depth: Real) -> Pt3 {
        Pt3::new(
            (u - self.cx) * depth / self.fx,
            (v - self.cy) * depth / self.fy,
            depth,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intr() -> PinholeIntrinsics {
        PinholeIntrinsics::new(500.0, 520.0, 320.0, 240.0)
    }

    #[test]
    fn project_backproject_roundtrip() {
        let k = intr();
        let p = Pt3::new(0.1, -0.05, 1.3);
        let uv = k.project(&p).unwrap();
        let back = k.backproject(uv.x, uv.y, p.z);
        assert!((back - p).norm() < 1e-12);
    }

    #[test]
    fn behind_camera_is_rejected() {
        assert!(intr().project(&Pt3::new(0.0, 0.0, -1.0)).is_none());
        assert!(intr().project(&Pt3::new(0.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn k_matrix_roundtrip() {
        let k = intr();
        let back = PinholeIntrinsics::from_k_matrix(&k.k_matrix()).unwrap();
        assert_eq!(back, k);
    }

    #[test]
    fn skewed_matrix_is_rejected() {
        let mut k = intr().k_matrix();
        k[(0, 1)] = 2.0;
        assert!(PinholeIntrinsics::from_k_matrix(&k).is_err());
    }
}
