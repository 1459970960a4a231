//! Generic rigid-motion and projection helpers used by autodiff residuals.

use nalgebra::{convert, RealField, Vector2, Vector3};

/// Depth floor applied before the perspective divide.
pub const PROJECTION_EPS: f64 = 1.0e-9;

/// Project a 3D point in camera coordinates using a pinhole model.
pub fn project_pinhole<T: RealField>(fx: T, fy: T, cx: T, cy: T, pc: Vector3<T>) -> Vector2<T> {
    let eps: T = convert(PROJECTION_EPS);
    let z = if pc.z > eps { pc.z.clone() } else { eps };
    let x = pc.x.clone() / z.clone();
    let y = pc.y.clone() / z;
    Vector2::new(fx * x + cx, fy * y + cy)
}

/// Rotate `p` by the axis-angle vector `w` (Rodrigues' formula).
///
/// Near zero rotation the first-order form `p + w × p` is used so the
/// derivative with respect to `w` stays exact at the identity.
pub fn rotate_axis_angle<T: RealField>(w: &Vector3<T>, p: &Vector3<T>) -> Vector3<T> {
    let theta2 = w.dot(w);
    let small: T = convert(1e-16);
    if theta2 <= small {
        return p + w.cross(p);
    }
    let theta = theta2.sqrt();
    let k = w / theta.clone();
    let (sin, cos) = theta.sin_cos();
    let one = T::one();
    p * cos.clone() + k.cross(p) * sin + &k * (k.dot(p) * (one - cos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;

    #[test]
    fn rodrigues_matches_quaternion() {
        let w = Vector3::new(0.3, -0.2, 0.5);
        let p = Vector3::new(1.0, 2.0, -0.5);
        let expected = UnitQuaternion::from_scaled_axis(w) * p;
        assert!((rotate_axis_angle(&w, &p) - expected).norm() < 1e-12);
    }

    #[test]
    fn zero_rotation_is_identity() {
        let p = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(rotate_axis_angle(&Vector3::zeros(), &p), p);
    }

    #[test]
    fn projection_of_optical_axis_point_is_principal_point() {
        let uv = project_pinhole(500.0, 500.0, 320.0, 240.0, Vector3::new(0.0, 0.0, 2.0));
        assert!((uv - Vector2::new(320.0, 240.0)).norm() < 1e-12);
    }
}
