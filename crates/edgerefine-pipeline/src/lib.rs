//! Occlusion-aware multi-view edge refinement of object poses.
//!
//! Given approximate model poses, a calibrated RGB-D sequence with camera
//! poses and a mesh per model, [`Refiner`] aligns the rendered silhouette
//! edges of every model with the edges observed in the color images:
//!
//! 1. [`OcclusionVisibilityFilter`] keeps the frames in which the model is
//!    mostly unoccluded,
//! 2. per iteration, each frame is rendered at the current pose, edges are
//!    detected in the rendered depth and in the grayscale image, and
//!    [`EdgeCorrespondenceFinder`] matches them along the model edge normals,
//! 3. pooled residual statistics decide convergence, otherwise a robust pose
//!    update runs over all frames.
//!
//! ```no_run
//! use edgerefine_pipeline::{load_config, load_scene, write_refined_poses};
//! use edgerefine_pipeline::{MeshRendererFactory, Refiner};
//! use std::path::Path;
//! # fn main() -> anyhow::Result<()> {
//! let config = load_config(Path::new("config.json"))?;
//! let scene = load_scene(Path::new("scene"), None)?;
//! let renderers = MeshRendererFactory::from_directory(
//!     &config.reference_models_dir,
//!     config.intrinsics,
//!     config.z_near,
//!     config.z_far,
//!     config.mesh_scale,
//! );
//! let refiner = Refiner::new(config, renderers);
//! let poses = refiner.refine_model_poses(&scene.model_poses, &scene.frames);
//! write_refined_poses(Path::new("scene"), &poses)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod correspondence;
pub mod diagnostics;
pub mod error;
pub mod frames;
pub mod lsd;
pub mod refiner;
pub mod render;
pub mod scene;
pub mod visibility;

/// Numeric identifier of a model (object) in a scene.
pub type ModelId = u32;

pub use config::{load_config, RefinerConfig, SolverConfig};
pub use correspondence::EdgeCorrespondenceFinder;
pub use error::RefineError;
pub use frames::{Frame, FrameSource, InMemorySequence};
pub use lsd::{LineSegmentDetector, LsdOptions, SegmentDetector};
pub use refiner::{IterationSummary, ModelRefinement, Refiner, Termination};
pub use render::{
    MeshRenderer, MeshRendererFactory, RenderError, Renderer, RendererFactory, Rendering,
    TriangleMesh,
};
pub use scene::{
    load_scene, read_camera_poses, read_pose_file, write_pose_file, write_refined_poses,
    RefinementInput, RgbdSequence,
};
pub use visibility::OcclusionVisibilityFilter;
