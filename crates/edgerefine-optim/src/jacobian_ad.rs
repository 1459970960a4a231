//! Per-frame Jacobian assembly for the model pose problem using `num-dual`.
//!
//! Every frame depends on the same 6 pose parameters, so each frame's
//! Jacobian block is computed with forward-mode autodiff over a 6-dimensional
//! dual vector and stacked row-wise into the global matrix.
//!
//! Robust kernel scales are applied by the caller and never differentiated here.

use crate::problems::model_pose::{frame_residuals_generic, ModelPoseProblem, POSE_DIM};
use crate::NllsProblem;
use nalgebra::{DMatrix, DVector, SVector};
use num_dual::{jacobian, DualSVec64};

/// Compute the global unweighted Jacobian using per-frame autodiff.
pub(crate) fn jacobian_unweighted_ad(problem: &ModelPoseProblem, x: &DVector<f64>) -> DMatrix<f64> {
    debug_assert_eq!(x.len(), POSE_DIM);
    let p0 = SVector::<f64, POSE_DIM>::from_column_slice(x.as_slice());
    let inv_scale = 1.0 / problem.scale;

    let mut j_global = DMatrix::zeros(problem.num_residuals(), POSE_DIM);
    let mut row_offset = 0;
    for frame in &problem.frames {
        let (r_frame, j_frame) = jacobian(
            |p: SVector<DualSVec64<POSE_DIM>, POSE_DIM>| {
                frame_residuals_generic(p.as_slice(), frame, &problem.intrinsics, inv_scale)
            },
            p0,
        );
        debug_assert_eq!(r_frame.len(), frame.observations.len());
        j_global
            .rows_mut(row_offset, j_frame.nrows())
            .copy_from(&j_frame);
        row_offset += j_frame.nrows();
    }
    debug_assert_eq!(row_offset, j_global.nrows());
    j_global
}
