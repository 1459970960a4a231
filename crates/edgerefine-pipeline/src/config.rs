//! Refiner configuration and its JSON loader.

use crate::lsd::LsdOptions;
use crate::scene::parse_matrix_text;
use anyhow::{bail, ensure, Context, Result};
use edgerefine_core::{Mat3, PinholeIntrinsics, Real};
use edgerefine_optim::{PoseSolveOptions, RobustKernel, SolveOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Nonlinear solver settings for the per-iteration pose update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iters: usize,
    /// Tukey cutoff in units of the residual standard deviation.
    pub tukey_c: Real,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iters: 100,
            tukey_c: edgerefine_optim::robust::TUKEY_DEFAULT_C,
        }
    }
}

impl SolverConfig {
    pub fn pose_solve_options(&self) -> PoseSolveOptions {
        PoseSolveOptions {
            solve: SolveOptions {
                max_iters: self.max_iters,
                ..SolveOptions::default()
            },
            kernel: RobustKernel::Tukey { c: self.tukey_c },
        }
    }
}

/// Everything the refiner needs besides the scene itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinerConfig {
    pub intrinsics: PinholeIntrinsics,
    /// Padding around the rendered model's bounding box, in pixels.
    pub model_padding_pixels: u32,
    /// Maximum number of one-pixel steps along each side of the edge normal.
    pub edge_search_span: u32,
    /// Distance between samples along a model edge, in pixels.
    pub point_sampling_step: Real,
    pub max_iterations: usize,
    /// Meters by which measured depth may lie in front of the model.
    pub occlusion_threshold: Real,
    /// Minimum visible share of model pixels for a frame to be used.
    pub object_visibility_threshold: Real,
    #[serde(default = "default_z_near")]
    pub z_near: Real,
    #[serde(default = "default_z_far")]
    pub z_far: Real,
    pub reference_models_dir: PathBuf,
    /// Factor applied to mesh vertex coordinates (e.g. 0.001 for millimeter meshes).
    #[serde(default = "default_mesh_scale")]
    pub mesh_scale: Real,
    /// Residual scale (pixels) handed to the optimizer when the MAD collapses to zero.
    #[serde(default = "default_degenerate_residual_scale")]
    pub degenerate_residual_scale: Real,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub segments: LsdOptions,
    /// When set, a composite image is written per frame and iteration.
    #[serde(default)]
    pub diagnostics_dir: Option<PathBuf>,
}

fn default_z_near() -> Real {
    0.001
}

fn default_z_far() -> Real {
    4.05
}

fn default_mesh_scale() -> Real {
    1.0
}

fn default_degenerate_residual_scale() -> Real {
    1.0
}

impl RefinerConfig {
    /// Configuration with the given intrinsics and the usual refinement settings.
    pub fn with_intrinsics(intrinsics: PinholeIntrinsics) -> Self {
        Self {
            intrinsics,
            model_padding_pixels: 10,
            edge_search_span: 10,
            point_sampling_step: 5.0,
            max_iterations: 20,
            occlusion_threshold: 0.01,
            object_visibility_threshold: 0.5,
            z_near: default_z_near(),
            z_far: default_z_far(),
            reference_models_dir: PathBuf::from("models"),
            mesh_scale: default_mesh_scale(),
            degenerate_residual_scale: default_degenerate_residual_scale(),
            solver: SolverConfig::default(),
            segments: LsdOptions::default(),
            diagnostics_dir: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.intrinsics.validate()?;
        ensure!(self.edge_search_span > 0, "edge_search_span must be positive");
        ensure!(
            self.point_sampling_step.is_finite() && self.point_sampling_step > 0.0,
            "point_sampling_step must be positive, got {}",
            self.point_sampling_step
        );
        ensure!(
            self.occlusion_threshold.is_finite() && self.occlusion_threshold >= 0.0,
            "occlusion_threshold must be non-negative, got {}",
            self.occlusion_threshold
        );
        ensure!(
            (0.0..1.0).contains(&self.object_visibility_threshold),
            "object_visibility_threshold must lie in [0, 1), got {}",
            self.object_visibility_threshold
        );
        ensure!(
            self.z_near > 0.0 && self.z_far > self.z_near,
            "clip planes must satisfy 0 < z_near < z_far (z_near={}, z_far={})",
            self.z_near,
            self.z_far
        );
        ensure!(
            self.mesh_scale.is_finite() && self.mesh_scale > 0.0,
            "mesh_scale must be positive"
        );
        ensure!(
            self.degenerate_residual_scale.is_finite() && self.degenerate_residual_scale > 0.0,
            "degenerate_residual_scale must be positive"
        );
        ensure!(
            self.solver.tukey_c.is_finite() && self.solver.tukey_c > 0.0,
            "solver.tukey_c must be positive"
        );
        Ok(())
    }
}

/// Read a whitespace-separated 3×3 calibration matrix.
pub fn read_intrinsics_file(path: &Path) -> Result<PinholeIntrinsics> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading intrinsics file {}", path.display()))?;
    let values = parse_matrix_text(&text, 3, 3)
        .with_context(|| format!("parsing intrinsics file {}", path.display()))?;
    PinholeIntrinsics::from_k_matrix(&Mat3::from_row_slice(&values))
}

/// Load and validate a JSON configuration.
///
/// The intrinsics are given either inline as `intrinsics` or through an
/// `intrinsics_file` holding a 3×3 matrix. Relative paths are resolved against
/// the directory containing the configuration file.
pub fn load_config(path: &Path) -> Result<RefinerConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    let Some(obj) = json.as_object_mut() else {
        bail!("config file {} is not a JSON object", path.display());
    };

    if let Some(file) = obj.remove("intrinsics_file") {
        let Some(file) = file.as_str() else {
            bail!("intrinsics_file must be a string");
        };
        if obj.contains_key("intrinsics") {
            bail!("config sets both intrinsics and intrinsics_file");
        }
        let intrinsics = read_intrinsics_file(&base.join(file))?;
        obj.insert("intrinsics".into(), serde_json::to_value(intrinsics)?);
    }

    let mut config: RefinerConfig = serde_json::from_value(json)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    config.reference_models_dir = base.join(&config.reference_models_dir);
    if let Some(dir) = config.diagnostics_dir.take() {
        config.diagnostics_dir = Some(base.join(dir));
    }
    config.validate()?;
    Ok(config)
}
