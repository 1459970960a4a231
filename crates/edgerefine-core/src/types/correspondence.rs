//! Per-frame edge correspondences between model silhouette samples and
//! observed image edges.
//!
//! Every sample along a model edge that has valid measured depth produces one
//! [`EdgeSample`]. A sample whose perpendicular search found an observed edge
//! carries an [`EdgeCorrespondence`]; otherwise it only keeps its search
//! segment for diagnostics. Matched data is never split across parallel
//! containers, so image points, world points and edge ids stay aligned.

use crate::{Iso3, Pt3, Vec2};
use serde::{Deserialize, Serialize};

/// One matched sample: an observed edge pixel tied to a model-frame 3D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeCorrespondence {
    /// Matched observed edge pixel.
    pub pixel: Vec2,
    /// Back-projected sample point expressed in the model frame.
    pub world_point: Pt3,
    /// Index of the observed edge the pixel belongs to.
    pub edge_id: usize,
    /// Unit normal of that observed edge in image space.
    pub edge_normal: Vec2,
}

/// A model-edge sample with its search segment and optional match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeSample {
    /// Endpoints of the perpendicular search range, `p + n * span` and `p - n * span`.
    pub search_segment: [Vec2; 2],
    pub correspondence: Option<EdgeCorrespondence>,
}

/// All samples collected for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub samples: Vec<EdgeSample>,
}

impl Correspondence {
    pub fn new(samples: Vec<EdgeSample>) -> Self {
        Self { samples }
    }

    /// Iterator over matched samples only.
    pub fn matches(&self) -> impl Iterator<Item = &EdgeCorrespondence> + '_ {
        self.samples.iter().filter_map(|s| s.correspondence.as_ref())
    }

    /// Number of matched samples.
    pub fn len(&self) -> usize {
        self.matches().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn image_points(&self) -> Vec<Vec2> {
        self.matches().map(|c| c.pixel).collect()
    }

    pub fn world_points(&self) -> Vec<Pt3> {
        self.matches().map(|c| c.world_point).collect()
    }

    pub fn observed_edge_ids(&self) -> Vec<usize> {
        self.matches().map(|c| c.edge_id).collect()
    }

    pub fn search_segments(&self) -> impl Iterator<Item = &[Vec2; 2]> + '_ {
        self.samples.iter().map(|s| &s.search_segment)
    }
}

/// Correspondences of one frame together with that frame's camera pose.
///
/// This is what the residual statistics and the pose optimizer consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    pub frame_index: usize,
    /// Camera-to-world pose of the frame.
    pub camera_pose: Iso3,
    pub correspondence: Correspondence,
}

impl FramePayload {
    pub fn new(frame_index: usize, camera_pose: Iso3, correspondence: Correspondence) -> Self {
        Self {
            frame_index,
            camera_pose,
            correspondence,
        }
    }
}
