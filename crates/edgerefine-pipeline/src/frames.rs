//! Access to the RGB-D frames of a scene.

use anyhow::{ensure, Result};
use edgerefine_core::{DepthImage, GrayImage, Iso3};

/// Index-aligned camera poses, measured depth and grayscale images.
///
/// Implementations are shared between model workers, so loading must not
/// require exclusive access.
pub trait FrameSource: Sync {
    fn num_frames(&self) -> usize;

    /// Camera-to-world pose of frame `index`.
    fn camera_pose(&self, index: usize) -> Iso3;

    /// Measured depth in meters; zero or non-finite where unknown.
    fn depth(&self, index: usize) -> Result<DepthImage>;

    fn grayscale(&self, index: usize) -> Result<GrayImage>;
}

/// One frame held in memory.
#[derive(Debug, Clone)]
pub struct Frame {
    pub camera_pose: Iso3,
    pub depth: DepthImage,
    pub gray: GrayImage,
}

/// Frames that are already decoded, mostly for synthetic scenes.
#[derive(Debug, Clone, Default)]
pub struct InMemorySequence {
    frames: Vec<Frame>,
}

impl InMemorySequence {
    pub fn new(frames: Vec<Frame>) -> Result<Self> {
        for (i, f) in frames.iter().enumerate() {
            ensure!(
                f.depth.width == f.gray.width && f.depth.height == f.gray.height,
                "frame {i}: depth is {}x{} but grayscale is {}x{}",
                f.depth.width,
                f.depth.height,
                f.gray.width,
                f.gray.height
            );
        }
        Ok(Self { frames })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

impl FrameSource for InMemorySequence {
    fn num_frames(&self) -> usize {
        self.frames.len()
    }

    fn camera_pose(&self, index: usize) -> Iso3 {
        self.frames[index].camera_pose
    }

    fn depth(&self, index: usize) -> Result<DepthImage> {
        Ok(self.frames[index].depth.clone())
    }

    fn grayscale(&self, index: usize) -> Result<GrayImage> {
        Ok(self.frames[index].gray.clone())
    }
}
