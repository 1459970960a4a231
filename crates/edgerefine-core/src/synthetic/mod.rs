//! Deterministic synthetic edge datasets for tests.
//!
//! A box-shaped model is observed by a ring of cameras. Points sampled along
//! the box edges are projected with a ground-truth model pose, optionally
//! displaced along the projected edge normal, and packed into
//! [`FramePayload`]s exactly as the correspondence stage would produce them.

pub mod noise;

use crate::{
    model_to_camera, Correspondence, EdgeCorrespondence, EdgeSample, FramePayload, Iso3,
    LineSegment, PinholeIntrinsics, Pt3, Real, Vec3,
};
use nalgebra::{Translation3, UnitQuaternion};
use noise::EdgeOffsetNoise;

/// The 12 edges of an axis-aligned box centered at the origin.
pub fn box_edges(half_extents: Vec3) -> Vec<(Pt3, Pt3)> {
    let h = half_extents;
    let corner = |i: usize| {
        Pt3::new(
            if i & 1 == 0 { -h.x } else { h.x },
            if i & 2 == 0 { -h.y } else { h.y },
            if i & 4 == 0 { -h.z } else { h.z },
        )
    };
    let mut edges = Vec::with_capacity(12);
    for i in 0..8usize {
        for bit in [1usize, 2, 4] {
            if i & bit == 0 {
                edges.push((corner(i), corner(i | bit)));
            }
        }
    }
    edges
}

/// Camera-to-world poses on a circle of `radius` around the origin at height
/// `height`, all looking at the origin (camera +Z forward, +Y down).
pub fn ring_camera_poses(n: usize, radius: Real, height: Real) -> Vec<Iso3> {
    (0..n)
        .map(|i| {
            let a = 2.0 * std::f64::consts::PI * i as Real / n.max(1) as Real;
            let eye = Pt3::new(radius * a.cos(), radius * a.sin(), height);
            let forward = (Pt3::origin() - eye).normalize();
            let up_hint = Vec3::new(0.0, 0.0, 1.0);
            let right = forward.cross(&up_hint).normalize();
            let down = forward.cross(&right);
            let rot = nalgebra::Rotation3::from_basis_unchecked(&[right, down, forward]);
            Iso3::from_parts(
                Translation3::from(eye.coords),
                UnitQuaternion::from_rotation_matrix(&rot),
            )
        })
        .collect()
}

/// Parameters for [`edge_payloads`].
#[derive(Debug, Clone)]
pub struct SyntheticEdgeScene {
    pub intrinsics: PinholeIntrinsics,
    pub model_pose: Iso3,
    pub camera_poses: Vec<Iso3>,
    pub edges: Vec<(Pt3, Pt3)>,
    pub samples_per_edge: usize,
    pub noise: EdgeOffsetNoise,
}

impl SyntheticEdgeScene {
    /// Box of 10×8×6 cm seen by six cameras 60 cm away.
    pub fn small_box() -> Self {
        Self {
            intrinsics: PinholeIntrinsics::new(600.0, 600.0, 320.0, 240.0),
            model_pose: Iso3::from_parts(
                Translation3::new(0.01, -0.02, 0.0),
                UnitQuaternion::from_euler_angles(0.05, -0.03, 0.2),
            ),
            camera_poses: ring_camera_poses(6, 0.5, 0.3),
            edges: box_edges(Vec3::new(0.05, 0.04, 0.03)),
            samples_per_edge: 8,
            noise: EdgeOffsetNoise::default(),
        }
    }
}

/// Project every edge sample with the ground-truth pose and pack the results.
///
/// Samples whose edge endpoints do not both project in front of the camera
/// are skipped. The stored edge normal is the normal of the projected edge.
pub fn edge_payloads(scene: &SyntheticEdgeScene) -> Vec<FramePayload> {
    let k = &scene.intrinsics;
    scene
        .camera_poses
        .iter()
        .enumerate()
        .map(|(frame_idx, camera_pose)| {
            let m2c = model_to_camera(camera_pose, &scene.model_pose);
            let mut samples = Vec::new();
            let mut sample_idx = 0usize;
            for (edge_id, (a, b)) in scene.edges.iter().enumerate() {
                let (Some(pa), Some(pb)) = (k.project(&(m2c * a)), k.project(&(m2c * b)))
                else {
                    continue;
                };
                let normal = LineSegment::new(pa.x, pa.y, pb.x, pb.y).normal();
                for s in 1..=scene.samples_per_edge {
                    let t = s as Real / (scene.samples_per_edge + 1) as Real;
                    let world_point = a + (b - a) * t;
                    let Some(uv) = k.project(&(m2c * world_point)) else {
                        continue;
                    };
                    let pixel = uv + normal * scene.noise.offset(frame_idx, sample_idx);
                    sample_idx += 1;
                    samples.push(EdgeSample {
                        search_segment: [pixel, pixel],
                        correspondence: Some(EdgeCorrespondence {
                            pixel,
                            world_point,
                            edge_id,
                            edge_normal: normal,
                        }),
                    });
                }
            }
            FramePayload::new(frame_idx, *camera_pose, Correspondence::new(samples))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_has_twelve_axis_aligned_edges() {
        let edges = box_edges(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(edges.len(), 12);
        for (a, b) in &edges {
            let d = b - a;
            let nonzero = d.iter().filter(|v| v.abs() > 0.0).count();
            assert_eq!(nonzero, 1);
        }
    }

    #[test]
    fn ring_cameras_look_at_origin() {
        for pose in ring_camera_poses(4, 1.0, 0.5) {
            let origin_cam = pose.inverse() * Pt3::origin();
            assert!(origin_cam.x.abs() < 1e-9 && origin_cam.y.abs() < 1e-9);
            assert!(origin_cam.z > 0.0);
        }
    }

    #[test]
    fn noiseless_payloads_reproject_exactly() {
        let scene = SyntheticEdgeScene::small_box();
        let payloads = edge_payloads(&scene);
        assert_eq!(payloads.len(), 6);
        for payload in &payloads {
            assert_eq!(payload.correspondence.len(), 12 * 8);
            let m2c = model_to_camera(&payload.camera_pose, &scene.model_pose);
            for c in payload.correspondence.matches() {
                let uv = scene.intrinsics.project(&(m2c * c.world_point)).unwrap();
                assert!((uv - c.pixel).norm() < 1e-9);
            }
        }
    }
}
