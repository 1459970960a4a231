use edgerefine_core::synthetic::{edge_payloads, noise::EdgeOffsetNoise, SyntheticEdgeScene};
use edgerefine_core::{Iso3, Real};
use edgerefine_optim::{compute_residual_statistics, optimize_model_pose, PoseSolveOptions};
use nalgebra::{Translation3, UnitQuaternion};

fn pose_error(a: &Iso3, b: &Iso3) -> (Real, Real) {
    let d = a.inverse() * b;
    (d.translation.vector.norm(), d.rotation.angle())
}

/// Alternate scale estimation and robust solves, as the refinement loop does.
fn refine(scene: &SyntheticEdgeScene, start: Iso3, outer_iters: usize) -> Iso3 {
    let payloads = edge_payloads(scene);
    let mut pose = start;
    for _ in 0..outer_iters {
        let stats = compute_residual_statistics(&payloads, &pose, &scene.intrinsics);
        let scale = stats.solver_scale(1.0);
        let (next, _) = optimize_model_pose(
            &payloads,
            &pose,
            &scene.intrinsics,
            scale,
            &PoseSolveOptions::default(),
        )
        .unwrap();
        pose = next;
    }
    pose
}

#[test]
fn recovers_pose_with_twenty_percent_outliers() {
    let mut scene = SyntheticEdgeScene::small_box();
    scene.noise = EdgeOffsetNoise {
        seed: 42,
        max_abs_px: 0.3,
        outlier_fraction: 0.2,
        outlier_px: 25.0,
    };
    let start = Iso3::from_parts(
        Translation3::new(0.003, -0.002, 0.002),
        UnitQuaternion::from_euler_angles(0.01, -0.01, 0.015),
    ) * scene.model_pose;

    let refined = refine(&scene, start, 5);

    let (dt, dr) = pose_error(&refined, &scene.model_pose);
    assert!(dt < 1e-3, "translation error {dt} m");
    assert!(dr < 5e-3, "rotation error {dr} rad");

    let payloads = edge_payloads(&scene);
    let stats = compute_residual_statistics(&payloads, &refined, &scene.intrinsics);
    assert!(
        (stats.inlier_fraction - 0.8).abs() < 0.05,
        "inlier fraction {}",
        stats.inlier_fraction
    );
}

#[test]
fn plain_least_squares_is_pulled_by_outliers() {
    let mut scene = SyntheticEdgeScene::small_box();
    scene.noise = EdgeOffsetNoise {
        seed: 42,
        max_abs_px: 0.3,
        outlier_fraction: 0.2,
        outlier_px: 25.0,
    };
    let payloads = edge_payloads(&scene);
    let opts = PoseSolveOptions {
        kernel: edgerefine_optim::RobustKernel::None,
        ..Default::default()
    };
    let (l2, _) =
        optimize_model_pose(&payloads, &scene.model_pose, &scene.intrinsics, 1.0, &opts).unwrap();
    let robust = refine(&scene, scene.model_pose, 2);

    let (dt_l2, _) = pose_error(&l2, &scene.model_pose);
    let (dt_robust, _) = pose_error(&robust, &scene.model_pose);
    assert!(
        dt_robust < dt_l2,
        "robust error {dt_robust} should beat L2 error {dt_l2}"
    );
}

#[test]
fn measured_scale_rejects_moderate_outliers() {
    let mut scene = SyntheticEdgeScene::small_box();
    scene.noise = EdgeOffsetNoise {
        seed: 42,
        max_abs_px: 0.3,
        outlier_fraction: 0.2,
        outlier_px: 3.0,
    };
    let payloads = edge_payloads(&scene);
    let stats = compute_residual_statistics(&payloads, &scene.model_pose, &scene.intrinsics);
    let scale = stats.solver_scale(1.0);
    assert!(scale < 1.0, "scale {scale}");

    let solve = |scale| {
        optimize_model_pose(
            &payloads,
            &scene.model_pose,
            &scene.intrinsics,
            scale,
            &PoseSolveOptions::default(),
        )
        .unwrap()
        .0
    };
    let (dt_measured, _) = pose_error(&solve(scale), &scene.model_pose);
    let (dt_unit, _) = pose_error(&solve(1.0), &scene.model_pose);
    assert!(
        dt_measured < dt_unit,
        "measured scale error {dt_measured} should beat unit scale error {dt_unit}"
    );
}
