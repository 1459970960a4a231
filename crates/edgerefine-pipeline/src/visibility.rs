//! Occlusion-aware frame selection.
//!
//! A frame is used for a model only when enough of the rendered model is not
//! hidden behind measured geometry.

use crate::error::RefineError;
use crate::frames::FrameSource;
use crate::render::Renderer;
use edgerefine_core::{model_to_camera, DepthImage, Iso3, Real};
use log::debug;

/// Depth below this value (meters) is treated as empty.
pub const MIN_VALID_DEPTH: f32 = 1e-3;

#[inline]
fn has_depth(d: f32) -> bool {
    d.is_finite() && d > MIN_VALID_DEPTH
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcclusionVisibilityFilter {
    /// A model pixel is occluded when the measured surface lies at least this
    /// far (meters) in front of the rendered one.
    pub occlusion_threshold: Real,
    /// Frames need a visible share strictly above this value.
    pub object_visibility_threshold: Real,
}

impl OcclusionVisibilityFilter {
    pub fn new(occlusion_threshold: Real, object_visibility_threshold: Real) -> Self {
        Self {
            occlusion_threshold,
            object_visibility_threshold,
        }
    }

    /// Share of rendered model pixels that are not occluded by measured depth.
    ///
    /// Holes in the measured depth count as visible. Returns 0 when the model
    /// covers no pixel.
    pub fn visible_fraction(&self, measured: &DepthImage, synthetic: &DepthImage) -> Real {
        let mut total = 0usize;
        let mut visible = 0usize;
        for (&s, &m) in synthetic.data.iter().zip(&measured.data) {
            if !has_depth(s) {
                continue;
            }
            total += 1;
            if !has_depth(m) || ((s - m) as Real) < self.occlusion_threshold {
                visible += 1;
            }
        }
        if total == 0 {
            0.0
        } else {
            visible as Real / total as Real
        }
    }

    pub fn is_visible(&self, measured: &DepthImage, synthetic: &DepthImage) -> bool {
        self.visible_fraction(measured, synthetic) > self.object_visibility_threshold
    }

    /// Indices of the frames in which the model at `model_pose` is visible.
    pub fn visible_frames<R, F>(
        &self,
        renderer: &mut R,
        frames: &F,
        model_pose: &Iso3,
    ) -> Result<Vec<usize>, RefineError>
    where
        R: Renderer + ?Sized,
        F: FrameSource + ?Sized,
    {
        let mut visible = Vec::new();
        for index in 0..frames.num_frames() {
            let measured = frames
                .depth(index)
                .map_err(|e| RefineError::frame(index, e))?;
            let m2c = model_to_camera(&frames.camera_pose(index), model_pose);
            let synthetic = renderer.render(&m2c)?.depth;
            if (measured.width, measured.height) != (synthetic.width, synthetic.height) {
                return Err(RefineError::DimensionMismatch {
                    index,
                    expected: (synthetic.width, synthetic.height),
                    found: (measured.width, measured.height),
                });
            }
            let fraction = self.visible_fraction(&measured, &synthetic);
            if fraction > self.object_visibility_threshold {
                visible.push(index);
            } else {
                debug!("frame {index}: visible fraction {fraction:.3}, skipping");
            }
        }
        Ok(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(values: &[f32]) -> DepthImage {
        DepthImage::from_vec(values.len(), 1, values.to_vec()).unwrap()
    }

    #[test]
    fn occluders_in_front_hide_model_pixels() {
        let synthetic = depth(&[1.0, 1.0, 1.0, 1.0, 0.0]);
        // in front by 0.5, behind, equal, hole, background
        let measured = depth(&[0.5, 1.2, 1.0, 0.0, 0.3]);
        let filter = OcclusionVisibilityFilter::new(0.02, 0.5);
        assert!((filter.visible_fraction(&measured, &synthetic) - 0.75).abs() < 1e-12);
        assert!(filter.is_visible(&measured, &synthetic));
    }

    #[test]
    fn empty_rendering_is_never_visible() {
        let synthetic = depth(&[0.0, f32::NAN, 0.0005]);
        let measured = depth(&[1.0, 1.0, 1.0]);
        let filter = OcclusionVisibilityFilter::new(0.02, 0.0);
        assert_eq!(filter.visible_fraction(&measured, &synthetic), 0.0);
        assert!(!filter.is_visible(&measured, &synthetic));
    }

    #[test]
    fn fraction_is_monotonic_in_occlusion_threshold() {
        let synthetic = depth(&[1.0; 8]);
        let measured = depth(&[0.2, 0.5, 0.8, 0.9, 0.95, 0.99, 1.0, f32::NAN]);
        let mut last = 0.0;
        for t in [0.0, 0.005, 0.02, 0.06, 0.15, 0.3, 0.6, 1.0] {
            let f = OcclusionVisibilityFilter::new(t, 0.5).visible_fraction(&measured, &synthetic);
            assert!(f >= last, "threshold {t}: {f} < {last}");
            last = f;
        }
        assert_eq!(last, 1.0);
    }
}
