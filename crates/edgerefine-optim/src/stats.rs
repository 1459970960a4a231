//! Pooled edge-normal residual statistics and the convergence test.

use edgerefine_core::{
    median, median_absolute_deviation, model_to_camera, FramePayload, Iso3, PinholeIntrinsics,
    Real,
};
use log::warn;
use serde::{Deserialize, Serialize};

/// Consistency factor turning a MAD into a Gaussian standard deviation.
pub const MAD_TO_STD: Real = 1.4826;
/// Residuals below this magnitude (pixels) count as aligned.
pub const INLIER_THRESHOLD_PX: Real = 1.5;
/// Minimum aligned share for convergence.
pub const CONVERGED_INLIER_FRACTION: Real = 0.9;
/// A robust scale at or below this (pixels) means the MAD collapsed.
pub const DEGENERATE_SCALE_PX: Real = 1e-6;

/// Summary of the pooled residuals for one model pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualStatistics {
    /// Robust scale `1.4826 * MAD`.
    pub std_dev: Real,
    pub median: Real,
    pub num_residuals: usize,
    /// Share of residuals with `|r| < 1.5` px; zero when there are none.
    pub inlier_fraction: Real,
    pub has_converged: bool,
}

impl ResidualStatistics {
    /// No residuals at all; never converged.
    pub fn is_degenerate(&self) -> bool {
        self.num_residuals == 0
    }

    /// Scale dividing the residuals in the robust cost.
    ///
    /// This is `std_dev` itself, or `fallback` when more than half of the
    /// residuals coincide and the MAD is zero.
    pub fn solver_scale(&self, fallback: Real) -> Real {
        if self.std_dev > DEGENERATE_SCALE_PX {
            self.std_dev
        } else {
            fallback
        }
    }
}

/// Signed residuals `dot(p - p', n)` of every matched sample across frames,
/// where `p` is the observed edge pixel and `p'` the projection of the
/// sample's model point under `model_pose`.
///
/// Samples that project at or behind a camera are skipped.
pub fn edge_residuals(
    payloads: &[FramePayload],
    model_pose: &Iso3,
    intrinsics: &PinholeIntrinsics,
) -> Vec<Real> {
    let mut residuals = Vec::new();
    for payload in payloads {
        let m2c = model_to_camera(&payload.camera_pose, model_pose);
        for c in payload.correspondence.matches() {
            if let Some(predicted) = intrinsics.project(&(m2c * c.world_point)) {
                residuals.push((c.pixel - predicted).dot(&c.edge_normal));
            }
        }
    }
    residuals
}

/// Robust scale and convergence flag of the pooled residuals.
///
/// Pure function of its inputs. With no residuals the result is degenerate:
/// `std_dev = 0` and `has_converged = false`.
pub fn compute_residual_statistics(
    payloads: &[FramePayload],
    model_pose: &Iso3,
    intrinsics: &PinholeIntrinsics,
) -> ResidualStatistics {
    let residuals = edge_residuals(payloads, model_pose, intrinsics);
    let Some(med) = median(&residuals) else {
        warn!("residual statistics over an empty correspondence set");
        return ResidualStatistics {
            std_dev: 0.0,
            median: 0.0,
            num_residuals: 0,
            inlier_fraction: 0.0,
            has_converged: false,
        };
    };

    let mad = median_absolute_deviation(&residuals).unwrap_or(0.0);
    let inliers = residuals
        .iter()
        .filter(|r| r.abs() < INLIER_THRESHOLD_PX)
        .count();
    let inlier_fraction = inliers as Real / residuals.len() as Real;

    ResidualStatistics {
        std_dev: MAD_TO_STD * mad,
        median: med,
        num_residuals: residuals.len(),
        inlier_fraction,
        has_converged: inlier_fraction >= CONVERGED_INLIER_FRACTION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgerefine_core::synthetic::{edge_payloads, noise::EdgeOffsetNoise, SyntheticEdgeScene};
    use nalgebra::{Translation3, Vector3};

    #[test]
    fn exact_observations_converge_with_zero_scale() {
        let scene = SyntheticEdgeScene::small_box();
        let payloads = edge_payloads(&scene);
        let stats = compute_residual_statistics(&payloads, &scene.model_pose, &scene.intrinsics);
        assert!(stats.has_converged);
        assert!(stats.std_dev < 1e-9, "std_dev {}", stats.std_dev);
        assert_eq!(stats.num_residuals, 6 * 12 * 8);
        assert!((stats.inlier_fraction - 1.0).abs() < 1e-12);
    }

    #[test]
    fn shifted_pose_is_not_converged() {
        let scene = SyntheticEdgeScene::small_box();
        let payloads = edge_payloads(&scene);
        let shifted = Translation3::from(Vector3::new(0.03, 0.02, 0.0)) * scene.model_pose;
        let stats = compute_residual_statistics(&payloads, &shifted, &scene.intrinsics);
        assert!(!stats.has_converged, "inlier fraction {}", stats.inlier_fraction);
        assert!(stats.std_dev > 0.0);
    }

    #[test]
    fn uniform_noise_scale_is_recovered() {
        let mut scene = SyntheticEdgeScene::small_box();
        scene.noise = EdgeOffsetNoise {
            seed: 11,
            max_abs_px: 1.0,
            ..Default::default()
        };
        let payloads = edge_payloads(&scene);
        let stats = compute_residual_statistics(&payloads, &scene.model_pose, &scene.intrinsics);
        // Uniform on [-1, 1]: MAD = 0.5.
        assert!(
            (stats.std_dev - MAD_TO_STD * 0.5).abs() < 0.15,
            "std_dev {}",
            stats.std_dev
        );
        assert!(stats.has_converged);
    }

    #[test]
    fn sub_pixel_scale_reaches_solver_unchanged() {
        let mut scene = SyntheticEdgeScene::small_box();
        scene.noise = EdgeOffsetNoise {
            seed: 5,
            max_abs_px: 0.3,
            ..Default::default()
        };
        let payloads = edge_payloads(&scene);
        let stats = compute_residual_statistics(&payloads, &scene.model_pose, &scene.intrinsics);
        assert!(stats.std_dev > DEGENERATE_SCALE_PX && stats.std_dev < 1.0);
        assert_eq!(stats.solver_scale(1.0), stats.std_dev);
    }

    #[test]
    fn collapsed_mad_falls_back() {
        let scene = SyntheticEdgeScene::small_box();
        let payloads = edge_payloads(&scene);
        let stats = compute_residual_statistics(&payloads, &scene.model_pose, &scene.intrinsics);
        assert_eq!(stats.solver_scale(1.0), 1.0);
        assert_eq!(stats.solver_scale(0.5), 0.5);
    }

    #[test]
    fn statistics_are_pure() {
        let scene = SyntheticEdgeScene::small_box();
        let payloads = edge_payloads(&scene);
        let a = compute_residual_statistics(&payloads, &scene.model_pose, &scene.intrinsics);
        let b = compute_residual_statistics(&payloads, &scene.model_pose, &scene.intrinsics);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_payloads_are_degenerate() {
        let scene = SyntheticEdgeScene::small_box();
        let stats = compute_residual_statistics(&[], &scene.model_pose, &scene.intrinsics);
        assert!(stats.is_degenerate());
        assert!(!stats.has_converged);
    }
}
