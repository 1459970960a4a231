//! Robust non-linear least squares for edge-based model pose refinement.
//!
//! The crate provides:
//! - the [`NllsProblem`] / [`NllsSolverBackend`] abstraction and a
//!   Levenberg–Marquardt backend ([`LmBackend`]),
//! - robust kernels, including the Tukey biweight used for pose refinement,
//! - [`compute_residual_statistics`], the convergence test over pooled
//!   edge-normal residuals,
//! - [`optimize_model_pose`], a 6-DoF model pose solve over all frames.

pub mod backend_lm;
pub(crate) mod jacobian_ad;
pub mod math;
pub mod problems;
pub mod robust;
pub mod stats;
pub mod traits;

pub use backend_lm::LmBackend;
pub use problems::model_pose::{optimize_model_pose, ModelPoseProblem, PoseSolveOptions};
pub use robust::RobustKernel;
pub use stats::{compute_residual_statistics, edge_residuals, ResidualStatistics};
pub use traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
