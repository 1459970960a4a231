//! SE(3) conversions between 4×4 matrices, isometries and optimizer parameters.
//!
//! The optimizer works on a 6-vector `[wx, wy, wz, tx, ty, tz]` where `w` is the
//! scaled rotation axis (axis-angle). Pose files store row-major 4×4 matrices.

use crate::{Iso3, Mat3, Mat4, Real, Vec3};
use anyhow::{ensure, Result};
use nalgebra::{Rotation3, SVector, Translation3, UnitQuaternion};

/// Build an isometry from a homogeneous 4×4 matrix.
///
/// The rotation block is projected onto SO(3), so slightly non-orthonormal
/// matrices read from text files are accepted. The last row must be `[0 0 0 1]`.
pub fn iso3_from_mat4(m: &Mat4) -> Result<Iso3> {
    let bottom = m.fixed_view::<1, 4>(3, 0);
    ensure!(
        bottom[0].abs() < 1e-6
            && bottom[1].abs() < 1e-6
            && bottom[2].abs() < 1e-6
            && (bottom[3] - 1.0).abs() < 1e-6,
        "not a rigid transform: last row is {:?}",
        bottom
    );
    ensure!(
        m.iter().all(|v| v.is_finite()),
        "pose matrix contains non-finite entries"
    );

    let r: Mat3 = m.fixed_view::<3, 3>(0, 0).into_owned();
    let rot = Rotation3::from_matrix_eps(&r, 1e-12, 100, Rotation3::identity());
    let t = Vec3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
    Ok(Iso3::from_parts(
        Translation3::from(t),
        UnitQuaternion::from_rotation_matrix(&rot),
    ))
}

/// Homogeneous 4×4 matrix of an isometry.
pub fn mat4_from_iso3(pose: &Iso3) -> Mat4 {
    pose.to_homogeneous()
}

/// Model-to-camera transform `inverse(camera_pose) * model_pose`.
pub fn model_to_camera(camera_pose: &Iso3, model_pose: &Iso3) -> Iso3 {
    camera_pose.inverse() * model_pose
}

/// Pack a pose into the 6D axis-angle + translation parameter vector.
pub fn axis_angle_params(pose: &Iso3) -> SVector<Real, 6> {
    let w = pose.rotation.scaled_axis();
    let t = pose.translation.vector;
    SVector::<Real, 6>::new(w.x, w.y, w.z, t.x, t.y, t.z)
}

/// Rebuild a pose from the 6D axis-angle + translation parameter vector.
pub fn iso3_from_params(params: &[Real]) -> Result<Iso3> {
    ensure!(
        params.len() == 6,
        "expected 6 pose parameters, got {}",
        params.len()
    );
    let rot = UnitQuaternion::from_scaled_axis(Vec3::new(params[0], params[1], params[2]));
    let t = Vec3::new(params[3], params[4], params[5]);
    Ok(Iso3::from_parts(Translation3::from(t), rot))
}
