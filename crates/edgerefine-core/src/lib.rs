//! Core math, image and correspondence primitives for `edgerefine`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, `Iso3`, ...) and pose helpers,
//! - the pinhole camera model used for projection and back-projection,
//! - owned row-major image buffers (depth, grayscale, edge-id labels),
//! - 2D line segments and their rasterization into edge-id label images,
//! - per-frame edge correspondence records consumed by the optimizer,
//! - deterministic synthetic data helpers for tests.
//!
//! Geometry conventions:
//! `pixel = K * project(inverse(camera_pose) * model_pose * world_point)`
//! where `world_point` lives in the model (object) frame.

/// Owned image buffers and region-of-interest helpers.
pub mod image;
/// Linear algebra type aliases and pose helpers.
pub mod math;
/// Camera models.
pub mod models;
/// 2D line segments and edge-id rasterization.
pub mod segment;
/// Deterministic synthetic data helpers.
pub mod synthetic;
/// Correspondence records shared between the pipeline and the optimizer.
pub mod types;

pub use image::*;
pub use math::*;
pub use models::*;
pub use segment::*;
pub use types::*;
