//! Perpendicular search from model silhouette edges to observed image edges.

use edgerefine_core::{
    Correspondence, DepthImage, EdgeCorrespondence, EdgeIdImage, EdgeSample, Iso3, LineSegment,
    PinholeIntrinsics, Real, Vec2, EDGE_BACKGROUND,
};

/// Averaged depth below this magnitude is treated as missing.
const MIN_SAMPLE_DEPTH: f32 = 1e-5;

/// Matches samples along model edges to the closest observed edge pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCorrespondenceFinder {
    pub intrinsics: PinholeIntrinsics,
    /// One-pixel steps searched on each side of a sample.
    pub edge_search_span: u32,
    /// Target spacing between samples along an edge, in pixels.
    pub point_sampling_step: Real,
}

impl EdgeCorrespondenceFinder {
    pub fn new(
        intrinsics: PinholeIntrinsics,
        edge_search_span: u32,
        point_sampling_step: Real,
    ) -> Self {
        Self {
            intrinsics,
            edge_search_span,
            point_sampling_step,
        }
    }

    /// Sample every model edge and search for observed edges along its normal.
    ///
    /// `depth` is sampled at the model edge to lift samples to 3D;
    /// `model_to_camera` maps those points back into the model frame.
    /// `edge_ids` holds indices into `observed_edges`, whose normals are
    /// attached to the matches.
    pub fn find(
        &self,
        depth: &DepthImage,
        edge_ids: &EdgeIdImage,
        observed_edges: &[LineSegment],
        model_to_camera: &Iso3,
        model_edges: &[LineSegment],
    ) -> Correspondence {
        let camera_to_model = model_to_camera.inverse();
        let samples = model_edges
            .iter()
            .flat_map(|edge| self.edge_sample_positions(edge).map(move |p| (edge, p)))
            .filter_map(|(edge, p)| {
                let d = neighborhood_depth(depth, &p);
                if !d.is_finite() || d.abs() < MIN_SAMPLE_DEPTH {
                    return None;
                }
                let p_cam = self.intrinsics.backproject(p.x, p.y, d as Real);
                let world_point = camera_to_model * p_cam;

                let n = edge.normal();
                let span = self.edge_search_span as Real;
                let search_segment = [p + n * span, p - n * span];
                let correspondence = self.search(edge_ids, &p, &n).and_then(|(pixel, id)| {
                    let observed = observed_edges.get(id)?;
                    Some(EdgeCorrespondence {
                        pixel,
                        world_point,
                        edge_id: id,
                        edge_normal: observed.normal(),
                    })
                });
                Some(EdgeSample {
                    search_segment,
                    correspondence,
                })
            })
            .collect();
        Correspondence::new(samples)
    }

    /// Interior sample positions `start - (start - end) * k / N`, `k = 1..N-1`,
    /// with `N = floor(length / step)`.
    fn edge_sample_positions(&self, edge: &LineSegment) -> impl Iterator<Item = Vec2> {
        let n = if self.point_sampling_step > 0.0 {
            (edge.length() / self.point_sampling_step).floor() as usize
        } else {
            0
        };
        let start = edge.start();
        let v = edge.reverse_direction();
        (1..n).map(move |k| start - v * (k as Real / n as Real))
    }

    /// First labelled pixel near `p ± n * i` for growing `i`, positive side first.
    fn search(&self, edge_ids: &EdgeIdImage, p: &Vec2, n: &Vec2) -> Option<(Vec2, usize)> {
        (1..=self.edge_search_span).find_map(|i| {
            let step = n * i as Real;
            label_near(edge_ids, &(p + step)).or_else(|| label_near(edge_ids, &(p - step)))
        })
    }
}

/// Mean of the positive finite depths in the 3×3 block around the rounded pixel.
fn neighborhood_depth(depth: &DepthImage, p: &Vec2) -> f32 {
    let (cx, cy) = (p.x.round() as i64, p.y.round() as i64);
    let mut sum = 0.0f32;
    let mut count = 0usize;
    for dy in -1..=1 {
        for dx in -1..=1 {
            if let Some(d) = depth.try_get(cx + dx, cy + dy) {
                if d.is_finite() && d > 0.0 {
                    sum += d;
                    count += 1;
                }
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Scan the 3×3 block around the rounded `c`, row by row, for an edge label.
///
/// The returned pixel is `c` shifted by the hit's block offset.
fn label_near(edge_ids: &EdgeIdImage, c: &Vec2) -> Option<(Vec2, usize)> {
    let (cx, cy) = (c.x.round() as i64, c.y.round() as i64);
    for dy in -1..=1i64 {
        for dx in -1..=1i64 {
            match edge_ids.try_get(cx + dx, cy + dy) {
                Some(id) if id != EDGE_BACKGROUND && id >= 0 => {
                    return Some((c + Vec2::new(dx as Real, dy as Real), id as usize));
                }
                _ => {}
            }
        }
    }
    None
}
