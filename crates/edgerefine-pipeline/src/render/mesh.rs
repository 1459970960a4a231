//! CPU z-buffer rasterizer for triangle meshes.

use super::ply::read_ply_mesh;
use super::{ColorImage, RenderError, Renderer, RendererFactory, Rendering};
use crate::ModelId;
use edgerefine_core::{DepthImage, Iso3, PinholeIntrinsics, Pt3, Real, Vec2};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    pub vertices: Vec<Pt3>,
    pub triangles: Vec<[usize; 3]>,
}

impl TriangleMesh {
    /// Mesh with every vertex multiplied by `scale`.
    pub fn scaled(mut self, scale: Real) -> Self {
        if scale != 1.0 {
            for v in &mut self.vertices {
                *v *= scale;
            }
        }
        self
    }
}

/// Renders one mesh with pinhole intrinsics at a fixed resolution.
#[derive(Debug, Clone)]
pub struct MeshRenderer {
    mesh: Arc<TriangleMesh>,
    intrinsics: PinholeIntrinsics,
    width: usize,
    height: usize,
    z_near: Real,
    z_far: Real,
}

impl MeshRenderer {
    pub fn new(
        mesh: Arc<TriangleMesh>,
        intrinsics: PinholeIntrinsics,
        width: usize,
        height: usize,
        z_near: Real,
        z_far: Real,
    ) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidResolution { width, height });
        }
        Ok(Self {
            mesh,
            intrinsics,
            width,
            height,
            z_near,
            z_far,
        })
    }

    fn rasterize(&self, tri: &[Pt3; 3], shade: u8, depth: &mut DepthImage, color: &mut ColorImage) {
        let k = &self.intrinsics;
        let screen: Vec<Vec2> = tri
            .iter()
            .map(|p| Vec2::new(k.fx * p.x / p.z + k.cx, k.fy * p.y / p.z + k.cy))
            .collect();
        let area = edge_function(&screen[0], &screen[1], &screen[2]);
        if area.abs() <= 1e-12 {
            return;
        }

        let min_x = screen.iter().map(|s| s.x).fold(Real::INFINITY, Real::min);
        let max_x = screen.iter().map(|s| s.x).fold(Real::NEG_INFINITY, Real::max);
        let min_y = screen.iter().map(|s| s.y).fold(Real::INFINITY, Real::min);
        let max_y = screen.iter().map(|s| s.y).fold(Real::NEG_INFINITY, Real::max);
        if max_x < 0.0 || max_y < 0.0 {
            return;
        }
        let x0 = min_x.ceil().max(0.0) as usize;
        let y0 = min_y.ceil().max(0.0) as usize;
        let x1 = (max_x.floor() as i64).min(self.width as i64 - 1);
        let y1 = (max_y.floor() as i64).min(self.height as i64 - 1);
        if x1 < 0 || y1 < 0 {
            return;
        }

        let inv_z = [1.0 / tri[0].z, 1.0 / tri[1].z, 1.0 / tri[2].z];
        let eps = 1e-9 * area.abs();
        for y in y0..=y1 as usize {
            for x in x0..=x1 as usize {
                let p = Vec2::new(x as Real, y as Real);
                let w0 = edge_function(&screen[1], &screen[2], &p) / area;
                let w1 = edge_function(&screen[2], &screen[0], &p) / area;
                let w2 = edge_function(&screen[0], &screen[1], &p) / area;
                if w0 < -eps || w1 < -eps || w2 < -eps {
                    continue;
                }
                let z = 1.0 / (w0 * inv_z[0] + w1 * inv_z[1] + w2 * inv_z[2]);
                if z < self.z_near || z > self.z_far {
                    continue;
                }
                let current = depth.get(x, y);
                if current > 0.0 && (current as Real) <= z {
                    continue;
                }
                depth.set(x, y, z as f32);
                color.set(x, y, [shade; 3]);
            }
        }
    }
}

/// Twice the signed area of `(a, b, p)`.
#[inline]
fn edge_function(a: &Vec2, b: &Vec2, p: &Vec2) -> Real {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Clip a camera-frame triangle against the plane `z = z_near`.
///
/// Returns zero, one or two triangles.
fn clip_near(tri: [Pt3; 3], z_near: Real) -> Vec<[Pt3; 3]> {
    let inside: Vec<bool> = tri.iter().map(|p| p.z >= z_near).collect();
    match inside.iter().filter(|&&i| i).count() {
        3 => vec![tri],
        0 => Vec::new(),
        _ => {
            let mut poly: Vec<Pt3> = Vec::with_capacity(4);
            for i in 0..3 {
                let a = tri[i];
                let b = tri[(i + 1) % 3];
                if inside[i] {
                    poly.push(a);
                }
                if inside[i] != inside[(i + 1) % 3] {
                    let t = (z_near - a.z) / (b.z - a.z);
                    poly.push(a + (b - a) * t);
                }
            }
            (1..poly.len() - 1)
                .map(|k| [poly[0], poly[k], poly[k + 1]])
                .collect()
        }
    }
}

impl Renderer for MeshRenderer {
    fn render(&mut self, model_to_camera: &Iso3) -> Result<Rendering, RenderError> {
        let mut depth = DepthImage::filled(self.width, self.height, 0.0);
        let mut color = ColorImage::filled(self.width, self.height, [0; 3]);
        let cam: Vec<Pt3> = self
            .mesh
            .vertices
            .iter()
            .map(|v| model_to_camera * v)
            .collect();

        for &[a, b, c] in &self.mesh.triangles {
            let tri = [cam[a], cam[b], cam[c]];
            let normal = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
            let view = tri[0].coords;
            let denom = normal.norm() * view.norm();
            let lambert = if denom > 0.0 {
                (normal.dot(&view) / denom).abs()
            } else {
                0.0
            };
            let shade = (40.0 + 215.0 * lambert).round().clamp(0.0, 255.0) as u8;
            for clipped in clip_near(tri, self.z_near) {
                self.rasterize(&clipped, shade, &mut depth, &mut color);
            }
        }
        Ok(Rendering { depth, color })
    }
}

#[derive(Debug, Clone)]
enum MeshSource {
    Directory(PathBuf),
    InMemory(BTreeMap<ModelId, Arc<TriangleMesh>>),
}

/// Opens [`MeshRenderer`] sessions for model ids.
///
/// Meshes come either from `obj_NNNNNN.ply` files in a directory or from an
/// in-memory registry.
#[derive(Debug, Clone)]
pub struct MeshRendererFactory {
    source: MeshSource,
    intrinsics: PinholeIntrinsics,
    z_near: Real,
    z_far: Real,
    mesh_scale: Real,
}

impl MeshRendererFactory {
    pub fn from_directory(
        models_dir: impl Into<PathBuf>,
        intrinsics: PinholeIntrinsics,
        z_near: Real,
        z_far: Real,
        mesh_scale: Real,
    ) -> Self {
        Self {
            source: MeshSource::Directory(models_dir.into()),
            intrinsics,
            z_near,
            z_far,
            mesh_scale,
        }
    }

    pub fn from_meshes(
        meshes: BTreeMap<ModelId, Arc<TriangleMesh>>,
        intrinsics: PinholeIntrinsics,
        z_near: Real,
        z_far: Real,
    ) -> Self {
        Self {
            source: MeshSource::InMemory(meshes),
            intrinsics,
            z_near,
            z_far,
            mesh_scale: 1.0,
        }
    }

    /// Path of the mesh file for `model_id` inside `models_dir`.
    pub fn model_path(models_dir: &std::path::Path, model_id: ModelId) -> PathBuf {
        models_dir.join(format!("obj_{model_id:06}.ply"))
    }
}

impl RendererFactory for MeshRendererFactory {
    type Renderer = MeshRenderer;

    fn open(
        &self,
        model_id: ModelId,
        width: usize,
        height: usize,
    ) -> Result<MeshRenderer, RenderError> {
        let mesh = match &self.source {
            MeshSource::Directory(dir) => {
                let path = Self::model_path(dir, model_id);
                let mesh = read_ply_mesh(&path)
                    .map_err(|source| RenderError::Mesh { model_id, source })?;
                Arc::new(mesh.scaled(self.mesh_scale))
            }
            MeshSource::InMemory(meshes) => meshes
                .get(&model_id)
                .cloned()
                .ok_or(RenderError::UnknownModel(model_id))?,
        };
        MeshRenderer::new(
            mesh,
            self.intrinsics,
            width,
            height,
            self.z_near,
            self.z_far,
        )
    }
}
