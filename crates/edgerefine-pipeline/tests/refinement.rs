//! End-to-end refinement on rendered plate scenes.
//!
//! A square plate 0.101 m wide faces the camera at 1 m. With `f = 500` its
//! border falls between pixel centers, so the rendered silhouette is stable
//! under sub-pixel pose noise.

use edgerefine_core::{model_to_camera, DepthImage, Iso3, PinholeIntrinsics, Pt3, Real};
use edgerefine_pipeline::{
    Frame, InMemorySequence, MeshRendererFactory, OcclusionVisibilityFilter, Refiner,
    RefinerConfig, Renderer, RendererFactory, Termination, TriangleMesh,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const W: usize = 128;
const H: usize = 128;
const PLATE: u32 = 1;

fn intrinsics() -> PinholeIntrinsics {
    PinholeIntrinsics::new(500.0, 500.0, 64.0, 64.0)
}

fn plate(side: Real) -> TriangleMesh {
    let h = side / 2.0;
    TriangleMesh {
        vertices: vec![
            Pt3::new(-h, -h, 0.0),
            Pt3::new(h, -h, 0.0),
            Pt3::new(h, h, 0.0),
            Pt3::new(-h, h, 0.0),
        ],
        triangles: vec![[0, 1, 2], [0, 2, 3]],
    }
}

fn factory() -> MeshRendererFactory {
    MeshRendererFactory::from_meshes(
        BTreeMap::from([(PLATE, Arc::new(plate(0.101)))]),
        intrinsics(),
        0.001,
        4.05,
    )
}

fn config() -> RefinerConfig {
    let mut c = RefinerConfig::with_intrinsics(intrinsics());
    c.model_padding_pixels = 10;
    c.edge_search_span = 8;
    c.point_sampling_step = 5.0;
    c.max_iterations = 5;
    c.occlusion_threshold = 0.02;
    c.object_visibility_threshold = 0.5;
    c
}

fn gt_pose() -> Iso3 {
    Iso3::translation(0.0, 0.0, 1.0)
}

/// Frame observing the plate at `model_pose`: measured depth and grayscale
/// are both taken from the rendering.
fn observed_frame(camera_pose: Iso3, model_pose: &Iso3) -> Frame {
    let mut renderer = factory().open(PLATE, W, H).unwrap();
    let rendering = renderer
        .render(&model_to_camera(&camera_pose, model_pose))
        .unwrap();
    Frame {
        camera_pose,
        depth: rendering.depth,
        gray: rendering.color.map(|c| c[0]),
    }
}

fn single_frame() -> InMemorySequence {
    InMemorySequence::new(vec![observed_frame(Iso3::identity(), &gt_pose())]).unwrap()
}

fn pose_error(a: &Iso3, b: &Iso3) -> (Real, Real) {
    let d = a.inverse() * b;
    (d.translation.vector.norm(), d.rotation.angle())
}

#[test]
fn aligned_plate_converges_immediately() {
    let frames = single_frame();
    let refiner = Refiner::new(config(), factory());
    let report = refiner.refine_model(PLATE, &gt_pose(), &frames).unwrap();

    assert_eq!(report.termination, Termination::Converged);
    assert_eq!(report.visible_frames, vec![0]);
    assert_eq!(report.iterations.len(), 1);
    assert_eq!(report.optimizer_invocations(), 0);
    let stats = report.iterations[0].statistics;
    assert!(stats.num_residuals >= 20, "only {} residuals", stats.num_residuals);
    assert!(stats.std_dev < 1e-6, "std_dev {}", stats.std_dev);
    assert_eq!(stats.inlier_fraction, 1.0);
    assert_eq!(report.pose, gt_pose());
}

#[test]
fn converged_pose_is_a_fixed_point() {
    let frames = single_frame();
    let refiner = Refiner::new(config(), factory());
    let start = Iso3::translation(0.006, -0.006, 1.0);
    let first = refiner.refine_model(PLATE, &start, &frames).unwrap();
    assert_eq!(first.termination, Termination::Converged);

    let second = refiner.refine_model(PLATE, &first.pose, &frames).unwrap();
    assert_eq!(second.termination, Termination::Converged);
    assert_eq!(second.optimizer_invocations(), 0);
    let (dt, dr) = pose_error(&first.pose, &second.pose);
    assert!(dt < 1e-9 && dr < 1e-9, "pose moved: dt={dt}, dr={dr}");
}

#[test]
fn diagonal_shift_is_recovered() {
    let frames = single_frame();
    let refiner = Refiner::new(config(), factory());
    // three pixels right and up
    let start = Iso3::translation(0.006, -0.006, 1.0);
    let report = refiner.refine_model(PLATE, &start, &frames).unwrap();

    assert_eq!(report.termination, Termination::Converged);
    assert!(report.optimizer_invocations() >= 1);
    let first = report.iterations[0].statistics;
    assert!(!first.has_converged);
    let (dt, dr) = pose_error(&report.pose, &gt_pose());
    assert!(dt < 1e-3, "translation error {dt}");
    assert!(dr < 1e-2, "rotation error {dr}");
}

#[test]
fn occluded_model_keeps_input_pose() {
    let mut frame = observed_frame(Iso3::identity(), &gt_pose());
    // a wall 0.5 m in front of the plate everywhere
    frame.depth = DepthImage::filled(W, H, 0.5);
    let frames = InMemorySequence::new(vec![frame]).unwrap();
    let start = Iso3::translation(0.002, 0.0, 1.0);

    let report = Refiner::new(config(), factory())
        .refine_model(PLATE, &start, &frames)
        .unwrap();
    assert_eq!(report.termination, Termination::NoVisibleFrames);
    assert!(report.visible_frames.is_empty());
    assert_eq!(report.optimizer_invocations(), 0);
    assert_eq!(report.pose, start);
}

#[test]
fn zero_iteration_budget_returns_input_pose() {
    let frames = single_frame();
    let mut cfg = config();
    cfg.max_iterations = 0;
    let start = Iso3::translation(0.006, -0.006, 1.0);

    let report = Refiner::new(cfg, factory())
        .refine_model(PLATE, &start, &frames)
        .unwrap();
    assert_eq!(report.termination, Termination::IterationBudgetExhausted);
    assert!(report.termination.is_success());
    assert_eq!(report.visible_frames, vec![0]);
    assert!(report.iterations.is_empty());
    assert_eq!(report.pose, start);
}

#[test]
fn featureless_images_stop_without_correspondences() {
    let mut frame = observed_frame(Iso3::identity(), &gt_pose());
    frame.gray.fill(0);
    let frames = InMemorySequence::new(vec![frame]).unwrap();
    let start = Iso3::translation(0.004, 0.0, 1.0);

    let report = Refiner::new(config(), factory())
        .refine_model(PLATE, &start, &frames)
        .unwrap();
    assert_eq!(report.termination, Termination::NoCorrespondences);
    assert_eq!(report.iterations.len(), 1);
    assert!(report.iterations[0].statistics.is_degenerate());
    assert_eq!(report.pose, start);
}

#[test]
fn visible_frame_count_grows_with_occlusion_threshold() {
    let mut frames = Vec::new();
    for wall in [None, Some(0.95f32), Some(0.9)] {
        let mut f = observed_frame(Iso3::identity(), &gt_pose());
        if let Some(d) = wall {
            f.depth = DepthImage::filled(W, H, d);
        }
        frames.push(f);
    }
    let frames = InMemorySequence::new(frames).unwrap();
    let mut renderer = factory().open(PLATE, W, H).unwrap();

    let mut last = 0;
    for (threshold, expected) in [(0.01, 1), (0.07, 2), (0.2, 3)] {
        let visible = OcclusionVisibilityFilter::new(threshold, 0.5)
            .visible_frames(&mut renderer, &frames, &gt_pose())
            .unwrap();
        assert_eq!(visible.len(), expected, "threshold {threshold}");
        assert!(visible.len() >= last);
        last = visible.len();
    }
}

#[test]
fn failed_models_keep_their_input_pose() {
    let frames = single_frame();
    let unknown = 7;
    let start = Iso3::translation(0.006, -0.006, 1.0);
    let poses = BTreeMap::from([(PLATE, start), (unknown, gt_pose())]);

    let refiner = Refiner::new(config(), factory());
    let outcomes = refiner.refine_all(&poses, &frames);
    assert!(outcomes[&PLATE].is_ok());
    assert!(outcomes[&unknown].is_err());

    let refined = refiner.refine_model_poses(&poses, &frames);
    assert_eq!(refined[&unknown], gt_pose());
    let (dt, _) = pose_error(&refined[&PLATE], &gt_pose());
    assert!(dt < 1e-3, "translation error {dt}");
}

#[test]
fn diagnostics_are_written_per_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config();
    cfg.diagnostics_dir = Some(dir.path().to_path_buf());
    let frames = single_frame();
    let start = Iso3::translation(0.006, -0.006, 1.0);

    let report = Refiner::new(cfg, factory())
        .refine_model(PLATE, &start, &frames)
        .unwrap();
    for it in 0..report.iterations.len() {
        let path = dir
            .path()
            .join("frame_000000")
            .join(format!("it_{it:03}.png"));
        assert!(path.is_file(), "missing {}", path.display());
    }
}
