//! Rendering boundary: synthetic depth/color images of a model at a pose.
//!
//! A [`RendererFactory`] opens one [`Renderer`] per model refinement session.
//! The renderer is owned by that session and reused for every frame and
//! iteration until the session ends.

pub mod mesh;
pub mod ply;

use crate::ModelId;
use edgerefine_core::{DepthImage, Image, Iso3};
use ply::PlyError;

pub use mesh::{MeshRenderer, MeshRendererFactory, TriangleMesh};

/// 8-bit RGB image.
pub type ColorImage = Image<[u8; 3]>;

/// Output of one render call. Depth is metric camera-frame z, zero where the
/// model does not cover the pixel.
#[derive(Debug, Clone)]
pub struct Rendering {
    pub depth: DepthImage,
    pub color: ColorImage,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to load mesh for model {model_id}")]
    Mesh {
        model_id: ModelId,
        #[source]
        source: PlyError,
    },
    #[error("no mesh registered for model {0}")]
    UnknownModel(ModelId),
    #[error("invalid render resolution {width}x{height}")]
    InvalidResolution { width: usize, height: usize },
}

/// Renders a fixed mesh with fixed intrinsics and resolution.
pub trait Renderer {
    fn render(&mut self, model_to_camera: &Iso3) -> Result<Rendering, RenderError>;
}

/// Opens renderer sessions; shared across worker threads.
pub trait RendererFactory: Sync {
    type Renderer: Renderer;

    fn open(
        &self,
        model_id: ModelId,
        width: usize,
        height: usize,
    ) -> Result<Self::Renderer, RenderError>;
}
