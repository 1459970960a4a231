//! Per-model render / correspond / optimize loop.
//!
//! For every model the refiner selects the frames where the model is not
//! occluded, then alternates between matching rendered silhouette edges to
//! observed image edges and a robust pose update until the pooled residuals
//! report convergence or the iteration budget is spent.

use crate::config::RefinerConfig;
use crate::correspondence::EdgeCorrespondenceFinder;
use crate::diagnostics::{edge_match_composite, save_edge_match_composite};
use crate::error::RefineError;
use crate::frames::FrameSource;
use crate::lsd::{LineSegmentDetector, SegmentDetector};
use crate::render::{Renderer, RendererFactory};
use crate::visibility::OcclusionVisibilityFilter;
use crate::ModelId;
use edgerefine_core::{
    depth_bounding_roi, draw_edge_ids, model_to_camera, normalize_min_max_u8, EdgeIdImage,
    FramePayload, GrayImage, Iso3, EDGE_BACKGROUND,
};
use edgerefine_optim::{
    compute_residual_statistics, optimize_model_pose, PoseSolveOptions, ResidualStatistics,
    SolveReport,
};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why the refinement of a model stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Residuals of the current pose passed the convergence test.
    Converged,
    /// `max_iterations` pose updates were made without convergence.
    IterationBudgetExhausted,
    /// No frame showed enough of the model; the input pose is returned.
    NoVisibleFrames,
    /// An iteration produced no matched samples; the current pose is returned.
    NoCorrespondences,
}

impl Termination {
    /// Whether the returned pose is the result of a completed refinement.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Termination::Converged | Termination::IterationBudgetExhausted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSummary {
    pub iteration: usize,
    /// Frames that contributed a payload.
    pub num_frames: usize,
    pub statistics: ResidualStatistics,
    /// Present when a pose update was run.
    pub solve: Option<SolveReport>,
}

/// Outcome of refining one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRefinement {
    pub model_id: ModelId,
    pub initial_pose: Iso3,
    pub pose: Iso3,
    pub termination: Termination,
    pub visible_frames: Vec<usize>,
    pub iterations: Vec<IterationSummary>,
}

impl ModelRefinement {
    pub fn optimizer_invocations(&self) -> usize {
        self.iterations.iter().filter(|it| it.solve.is_some()).count()
    }

    fn unchanged(model_id: ModelId, pose: Iso3, termination: Termination) -> Self {
        Self {
            model_id,
            initial_pose: pose,
            pose,
            termination,
            visible_frames: Vec::new(),
            iterations: Vec::new(),
        }
    }
}

/// Drives edge-based refinement with renderers from `F` and segments from `D`.
#[derive(Debug, Clone)]
pub struct Refiner<F, D = LineSegmentDetector> {
    config: RefinerConfig,
    renderers: F,
    detector: D,
}

impl<F: RendererFactory> Refiner<F> {
    /// Refiner using the built-in line segment detector configured by `config.segments`.
    pub fn new(config: RefinerConfig, renderers: F) -> Self {
        let detector = LineSegmentDetector::new(config.segments);
        Self {
            config,
            renderers,
            detector,
        }
    }
}

impl<F, D> Refiner<F, D>
where
    F: RendererFactory,
    D: SegmentDetector + Sync,
{
    pub fn with_detector(config: RefinerConfig, renderers: F, detector: D) -> Self {
        Self {
            config,
            renderers,
            detector,
        }
    }

    pub fn config(&self) -> &RefinerConfig {
        &self.config
    }

    fn visibility_filter(&self) -> OcclusionVisibilityFilter {
        OcclusionVisibilityFilter::new(
            self.config.occlusion_threshold,
            self.config.object_visibility_threshold,
        )
    }

    fn finder(&self) -> EdgeCorrespondenceFinder {
        EdgeCorrespondenceFinder::new(
            self.config.intrinsics,
            self.config.edge_search_span,
            self.config.point_sampling_step,
        )
    }

    /// Refine one model against `frames`, starting from `initial_pose`.
    pub fn refine_model<S: FrameSource + ?Sized>(
        &self,
        model_id: ModelId,
        initial_pose: &Iso3,
        frames: &S,
    ) -> Result<ModelRefinement, RefineError> {
        if frames.num_frames() == 0 {
            warn!("model {model_id}: no frames, keeping the input pose");
            return Ok(ModelRefinement::unchanged(
                model_id,
                *initial_pose,
                Termination::NoVisibleFrames,
            ));
        }
        let first = frames.depth(0).map_err(|e| RefineError::frame(0, e))?;
        let mut renderer = self.renderers.open(model_id, first.width, first.height)?;

        let visible_frames = self
            .visibility_filter()
            .visible_frames(&mut renderer, frames, initial_pose)?;
        if visible_frames.is_empty() {
            warn!("model {model_id}: not visible in any frame, keeping the input pose");
            return Ok(ModelRefinement::unchanged(
                model_id,
                *initial_pose,
                Termination::NoVisibleFrames,
            ));
        }
        info!(
            "model {model_id}: refining on {} of {} frames",
            visible_frames.len(),
            frames.num_frames()
        );

        let mut views = Vec::with_capacity(visible_frames.len());
        for &index in &visible_frames {
            let gray = frames
                .grayscale(index)
                .map_err(|e| RefineError::frame(index, e))?;
            if (gray.width, gray.height) != (first.width, first.height) {
                return Err(RefineError::DimensionMismatch {
                    index,
                    expected: (first.width, first.height),
                    found: (gray.width, gray.height),
                });
            }
            views.push(View {
                index,
                camera_pose: frames.camera_pose(index),
                gray,
            });
        }

        let solve_opts = self.config.solver.pose_solve_options();
        let mut pose = *initial_pose;
        let mut iterations = Vec::new();
        let mut termination = Termination::IterationBudgetExhausted;

        for iteration in 0..self.config.max_iterations {
            let mut payloads = Vec::with_capacity(views.len());
            for view in &views {
                if let Some(payload) = self.frame_payload(&mut renderer, view, &pose, iteration)? {
                    payloads.push(payload);
                }
            }

            let statistics = compute_residual_statistics(&payloads, &pose, &self.config.intrinsics);
            debug!(
                "model {model_id} iteration {iteration}: {} residuals, std {:.3} px, inliers {:.3}",
                statistics.num_residuals, statistics.std_dev, statistics.inlier_fraction
            );
            let mut summary = IterationSummary {
                iteration,
                num_frames: payloads.len(),
                statistics,
                solve: None,
            };

            if statistics.is_degenerate() {
                warn!("model {model_id}: no correspondences in iteration {iteration}");
                iterations.push(summary);
                termination = Termination::NoCorrespondences;
                break;
            }
            if statistics.has_converged {
                iterations.push(summary);
                termination = Termination::Converged;
                break;
            }

            let (updated, report) = self.update_pose(
                model_id,
                &payloads,
                &pose,
                &statistics,
                &solve_opts,
            )?;
            pose = updated;
            summary.solve = Some(report);
            iterations.push(summary);
        }

        info!(
            "model {model_id}: {termination:?} after {} iterations",
            iterations.len()
        );
        Ok(ModelRefinement {
            model_id,
            initial_pose: *initial_pose,
            pose,
            termination,
            visible_frames,
            iterations,
        })
    }

    fn update_pose(
        &self,
        model_id: ModelId,
        payloads: &[FramePayload],
        pose: &Iso3,
        statistics: &ResidualStatistics,
        opts: &PoseSolveOptions,
    ) -> Result<(Iso3, SolveReport), RefineError> {
        let scale = statistics.solver_scale(self.config.degenerate_residual_scale);
        optimize_model_pose(payloads, pose, &self.config.intrinsics, scale, opts).map_err(|e| {
            RefineError::Optimizer {
                model_id,
                source: e.into(),
            }
        })
    }

    /// Render, extract both edge sets and match them for one frame.
    ///
    /// Returns `None` when the model covers no pixel at `pose`.
    fn frame_payload<R: Renderer + ?Sized>(
        &self,
        renderer: &mut R,
        view: &View,
        pose: &Iso3,
        iteration: usize,
    ) -> Result<Option<FramePayload>, RefineError> {
        let m2c = model_to_camera(&view.camera_pose, pose);
        let rendering = renderer.render(&m2c)?;
        let depth = &rendering.depth;
        let padding = self.config.model_padding_pixels as usize;
        let Some(roi) = depth_bounding_roi(depth, padding) else {
            debug!("frame {}: model outside the image", view.index);
            return Ok(None);
        };

        let model_edges = self.detector.detect(&normalize_min_max_u8(depth), &roi);
        let observed_edges = self.detector.detect(&view.gray, &roi);
        if observed_edges.is_empty() {
            warn!("frame {}: no image edges around the model", view.index);
        }
        let mut edge_ids = EdgeIdImage::filled(depth.width, depth.height, EDGE_BACKGROUND);
        draw_edge_ids(&mut edge_ids, &observed_edges);

        let correspondence = self
            .finder()
            .find(depth, &edge_ids, &observed_edges, &m2c, &model_edges);
        debug!(
            "frame {}: {} model edges, {} image edges, {}/{} samples matched",
            view.index,
            model_edges.len(),
            observed_edges.len(),
            correspondence.len(),
            correspondence.samples.len()
        );

        if let Some(dir) = &self.config.diagnostics_dir {
            let composite = edge_match_composite(
                depth.width as u32,
                depth.height as u32,
                &model_edges,
                &observed_edges,
                &correspondence,
            );
            if let Err(e) = save_edge_match_composite(dir, view.index, iteration, &composite) {
                warn!("frame {}: {e:#}", view.index);
            }
        }

        Ok(Some(FramePayload::new(
            view.index,
            view.camera_pose,
            correspondence,
        )))
    }

    /// Refine every model in parallel; each worker opens its own renderer.
    pub fn refine_all<S: FrameSource + ?Sized>(
        &self,
        model_poses: &BTreeMap<ModelId, Iso3>,
        frames: &S,
    ) -> BTreeMap<ModelId, Result<ModelRefinement, RefineError>> {
        model_poses
            .par_iter()
            .map(|(&id, pose)| (id, self.refine_model(id, pose, frames)))
            .collect()
    }

    /// Refined pose per model. Models whose refinement failed keep their
    /// input pose.
    pub fn refine_model_poses<S: FrameSource + ?Sized>(
        &self,
        model_poses: &BTreeMap<ModelId, Iso3>,
        frames: &S,
    ) -> BTreeMap<ModelId, Iso3> {
        self.refine_all(model_poses, frames)
            .into_iter()
            .map(|(id, outcome)| match outcome {
                Ok(report) => (id, report.pose),
                Err(e) => {
                    warn!("model {id}: refinement failed, keeping the input pose: {e}");
                    (id, model_poses[&id])
                }
            })
            .collect()
    }
}

/// A visible frame with its grayscale image, loaded once per model.
struct View {
    index: usize,
    camera_pose: Iso3,
    gray: GrayImage,
}
