//! 6-DoF model pose refinement against edge correspondences of many frames.
//!
//! Parameters are `[wx, wy, wz, tx, ty, tz]`: the axis-angle rotation and the
//! translation of the model-to-world pose. Camera poses are constants. Each
//! matched sample contributes one scalar residual
//! `dot(predicted_pixel - observed_pixel, edge_normal) / scale`, robustified by
//! the configured kernel.

use crate::jacobian_ad::jacobian_unweighted_ad;
use crate::math::projection::{project_pinhole, rotate_axis_angle};
use crate::{LmBackend, NllsProblem, NllsSolverBackend, RobustKernel, SolveOptions, SolveReport};
use anyhow::{ensure, Result};
use edgerefine_core::{
    axis_angle_params, iso3_from_params, model_to_camera, FramePayload, Iso3, PinholeIntrinsics,
    Pt3, Real, Vec2,
};
use log::debug;
use nalgebra::{convert, DMatrix, DVector, Matrix3, RealField, Vector3};
use serde::{Deserialize, Serialize};

pub(crate) const POSE_DIM: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeObservation {
    pub world_point: Pt3,
    pub pixel: Vec2,
    pub normal: Vec2,
}

/// Observations of one frame with that frame's fixed world-to-camera transform.
#[derive(Debug, Clone)]
pub struct FrameObservations {
    pub camera_from_world: Iso3,
    pub observations: Vec<EdgeObservation>,
}

#[derive(Debug, Clone)]
pub struct ModelPoseProblem {
    pub frames: Vec<FrameObservations>,
    pub intrinsics: PinholeIntrinsics,
    /// Residuals are divided by this scale before the robust kernel.
    pub scale: Real,
    pub kernel: RobustKernel,
}

impl ModelPoseProblem {
    /// Collect matched samples from `payloads`.
    ///
    /// Samples behind the camera at `model_pose` are dropped, as are frames
    /// left without observations.
    pub fn from_payloads(
        payloads: &[FramePayload],
        model_pose: &Iso3,
        intrinsics: PinholeIntrinsics,
        scale: Real,
        kernel: RobustKernel,
    ) -> Self {
        let frames = payloads
            .iter()
            .filter_map(|payload| {
                let m2c = model_to_camera(&payload.camera_pose, model_pose);
                let observations: Vec<EdgeObservation> = payload
                    .correspondence
                    .matches()
                    .filter(|c| intrinsics.project(&(m2c * c.world_point)).is_some())
                    .map(|c| EdgeObservation {
                        world_point: c.world_point,
                        pixel: c.pixel,
                        normal: c.edge_normal,
                    })
                    .collect();
                (!observations.is_empty()).then(|| FrameObservations {
                    camera_from_world: payload.camera_pose.inverse(),
                    observations,
                })
            })
            .collect();
        Self {
            frames,
            intrinsics,
            scale,
            kernel,
        }
    }
}

/// Scaled edge-normal residuals of one frame for pose parameters `pose`.
pub(crate) fn frame_residuals_generic<T: RealField>(
    pose: &[T],
    frame: &FrameObservations,
    intrinsics: &PinholeIntrinsics,
    inv_scale: Real,
) -> DVector<T> {
    debug_assert_eq!(pose.len(), POSE_DIM);
    let w = Vector3::new(pose[0].clone(), pose[1].clone(), pose[2].clone());
    let t = Vector3::new(pose[3].clone(), pose[4].clone(), pose[5].clone());

    let r_cw: Matrix3<T> = frame
        .camera_from_world
        .rotation
        .to_rotation_matrix()
        .into_inner()
        .map(|v| convert(v));
    let t_cw: Vector3<T> = frame.camera_from_world.translation.vector.map(|v| convert(v));

    let fx: T = convert(intrinsics.fx);
    let fy: T = convert(intrinsics.fy);
    let cx: T = convert(intrinsics.cx);
    let cy: T = convert(intrinsics.cy);
    let inv_scale: T = convert(inv_scale);

    DVector::from_iterator(
        frame.observations.len(),
        frame.observations.iter().map(|obs| {
            let pm: Vector3<T> = obs.world_point.coords.map(|v| convert(v));
            let pw = rotate_axis_angle(&w, &pm) + &t;
            let pc = &r_cw * pw + &t_cw;
            let proj = project_pinhole(fx.clone(), fy.clone(), cx.clone(), cy.clone(), pc);
            let du = proj.x.clone() - convert::<f64, T>(obs.pixel.x);
            let dv = proj.y.clone() - convert::<f64, T>(obs.pixel.y);
            (du * convert::<f64, T>(obs.normal.x) + dv * convert::<f64, T>(obs.normal.y))
                * inv_scale.clone()
        }),
    )
}

impl NllsProblem for ModelPoseProblem {
    fn num_params(&self) -> usize {
        POSE_DIM
    }

    fn num_residuals(&self) -> usize {
        self.frames.iter().map(|f| f.observations.len()).sum()
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
        let inv_scale = 1.0 / self.scale;
        let mut r = DVector::zeros(self.num_residuals());
        let mut offset = 0;
        for frame in &self.frames {
            let rf = frame_residuals_generic(x.as_slice(), frame, &self.intrinsics, inv_scale);
            r.rows_mut(offset, rf.len()).copy_from(&rf);
            offset += rf.len();
        }
        r
    }

    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real> {
        jacobian_unweighted_ad(self, x)
    }

    fn robust_row_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        r_unweighted.map(|r| self.kernel.residual_scale(r))
    }

    fn robust_jacobian_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        r_unweighted.map(|r| self.kernel.jacobian_scale(r))
    }
}

/// Solver settings for [`optimize_model_pose`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSolveOptions {
    pub solve: SolveOptions,
    pub kernel: RobustKernel,
}

impl Default for PoseSolveOptions {
    fn default() -> Self {
        Self {
            solve: SolveOptions::default(),
            kernel: RobustKernel::Tukey {
                c: crate::robust::TUKEY_DEFAULT_C,
            },
        }
    }
}

/// Refine `model_pose` against all matched samples of `payloads`.
///
/// `scale` is the residual standard deviation in pixels; residuals are
/// expressed in units of it before the robust kernel is applied.
pub fn optimize_model_pose(
    payloads: &[FramePayload],
    model_pose: &Iso3,
    intrinsics: &PinholeIntrinsics,
    scale: Real,
    opts: &PoseSolveOptions,
) -> Result<(Iso3, SolveReport)> {
    ensure!(
        scale.is_finite() && scale > 0.0,
        "residual scale must be positive and finite, got {scale}"
    );
    let problem =
        ModelPoseProblem::from_payloads(payloads, model_pose, *intrinsics, scale, opts.kernel);
    ensure!(
        problem.num_residuals() > 0,
        "no correspondences in front of the camera"
    );

    let x0 = DVector::from_column_slice(axis_angle_params(model_pose).as_slice());
    let (x, report) = LmBackend.solve(&problem, x0, &opts.solve);
    debug!(
        "pose solve over {} residuals in {} frames: cost {:.4e}, converged {}",
        problem.num_residuals(),
        problem.frames.len(),
        report.final_cost,
        report.converged
    );
    Ok((iso3_from_params(x.as_slice())?, report))
}
