use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use edgerefine_pipeline::{
    load_config, load_scene, write_refined_poses, MeshRendererFactory, ModelId, ModelRefinement,
    Refiner,
};
use log::{info, warn};

/// Refine object poses against a multi-view RGB-D scene.
#[derive(Debug, Parser)]
#[command(author, version, about = "Edge-based multi-view object pose refinement")]
struct Args {
    /// Scene directory with camera_poses.txt, images/ and object_poses/.
    #[arg(long)]
    scene_dir: PathBuf,

    /// JSON refiner configuration.
    #[arg(long)]
    config_file: PathBuf,

    /// Comma-separated model ids. Defaults to every pose file in object_poses/.
    #[arg(long, value_delimiter = ',')]
    model_ids: Option<Vec<ModelId>>,
}

/// Refine the selected models of a scene and write `refined_object_poses/`.
///
/// Returns the per-model reports as pretty JSON. Models whose refinement
/// failed keep their input pose and are left out of the reports.
fn run_refinement_from_files(
    scene_dir: &Path,
    config_file: &Path,
    model_ids: Option<&[ModelId]>,
) -> Result<String> {
    let config = load_config(config_file)?;
    let scene = load_scene(scene_dir, model_ids)?;
    let renderers = MeshRendererFactory::from_directory(
        &config.reference_models_dir,
        config.intrinsics,
        config.z_near,
        config.z_far,
        config.mesh_scale,
    );
    let refiner = Refiner::new(config, renderers);

    let mut poses = BTreeMap::new();
    let mut reports: Vec<ModelRefinement> = Vec::new();
    for (id, outcome) in refiner.refine_all(&scene.model_poses, &scene.frames) {
        match outcome {
            Ok(report) => {
                poses.insert(id, report.pose);
                reports.push(report);
            }
            Err(e) => {
                warn!("model {id}: {e}, keeping the input pose");
                poses.insert(id, scene.model_poses[&id]);
            }
        }
    }

    let out_dir = write_refined_poses(scene_dir, &poses)?;
    info!("wrote {} poses to {}", poses.len(), out_dir.display());
    serde_json::to_string_pretty(&reports).context("serializing refinement reports")
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let json = run_refinement_from_files(
        &args.scene_dir,
        &args.config_file,
        args.model_ids.as_deref(),
    )?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgerefine_core::{Iso3, PinholeIntrinsics};
    use edgerefine_pipeline::{
        read_pose_file, write_pose_file, Renderer, RendererFactory, Termination,
    };
    use image::{ImageBuffer, Luma, Rgb, RgbImage};
    use std::fs;

    const W: usize = 128;
    const H: usize = 128;

    const PLATE_PLY: &str = "ply
format ascii 1.0
element vertex 4
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
-0.0505 -0.0505 0
0.0505 -0.0505 0
0.0505 0.0505 0
-0.0505 0.0505 0
4 0 1 2 3
";

    fn gt_pose() -> Iso3 {
        Iso3::translation(0.0, 0.0, 1.0)
    }

    /// Scene with one frame of a plate and a start pose three pixels off.
    fn write_scene(root: &Path) {
        let models = root.join("models");
        fs::create_dir_all(&models).unwrap();
        fs::write(models.join("obj_000001.ply"), PLATE_PLY).unwrap();
        fs::write(root.join("camera.txt"), "500 0 64\n0 500 64\n0 0 1\n").unwrap();
        fs::write(
            root.join("config.json"),
            r#"{
                "intrinsics_file": "camera.txt",
                "model_padding_pixels": 10,
                "edge_search_span": 8,
                "point_sampling_step": 5,
                "max_iterations": 5,
                "reference_models_dir": "models",
                "occlusion_threshold": 0.02,
                "object_visibility_threshold": 0.5
            }"#,
        )
        .unwrap();

        let intrinsics = PinholeIntrinsics::new(500.0, 500.0, 64.0, 64.0);
        let factory = MeshRendererFactory::from_directory(&models, intrinsics, 0.001, 4.05, 1.0);
        let rendering = factory.open(1, W, H).unwrap().render(&gt_pose()).unwrap();

        let scene = root.join("scene");
        for dir in ["images/rgb", "images/depth", "object_poses"] {
            fs::create_dir_all(scene.join(dir)).unwrap();
        }
        let rgb = RgbImage::from_fn(W as u32, H as u32, |x, y| {
            Rgb(rendering.color.get(x as usize, y as usize))
        });
        rgb.save(scene.join("images/rgb/000000.png")).unwrap();
        let depth: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(W as u32, H as u32, |x, y| {
                let d = rendering.depth.get(x as usize, y as usize);
                Luma([(d * 1000.0).round() as u16])
            });
        depth.save(scene.join("images/depth/000000.png")).unwrap();

        fs::write(
            scene.join("camera_poses.txt"),
            "0\n1 0 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1\n",
        )
        .unwrap();
        write_pose_file(
            &scene.join("object_poses/000001.txt"),
            &Iso3::translation(0.006, -0.006, 1.0),
        )
        .unwrap();
    }

    #[test]
    fn helper_refines_scene_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        write_scene(dir.path());
        let scene = dir.path().join("scene");

        let json =
            run_refinement_from_files(&scene, &dir.path().join("config.json"), None).unwrap();
        let reports: Vec<ModelRefinement> = serde_json::from_str(&json).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].termination, Termination::Converged);

        let refined = read_pose_file(&scene.join("refined_object_poses/000001.txt")).unwrap();
        let err = (refined.translation.vector - gt_pose().translation.vector).norm();
        assert!(err < 1e-3, "translation error {err}");
    }

    #[test]
    fn missing_model_ids_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_scene(dir.path());
        let scene = dir.path().join("scene");

        let json =
            run_refinement_from_files(&scene, &dir.path().join("config.json"), Some(&[2][..]))
                .unwrap();
        let reports: Vec<ModelRefinement> = serde_json::from_str(&json).unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn parses_model_id_list() {
        let args = Args::parse_from([
            "edgerefine",
            "--scene-dir",
            "s",
            "--config-file",
            "c.json",
            "--model-ids",
            "1,2,5",
        ]);
        assert_eq!(args.model_ids, Some(vec![1, 2, 5]));
    }
}
