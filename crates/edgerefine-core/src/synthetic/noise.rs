//! Deterministic noise for synthetic edge observations.
//!
//! Offsets are drawn from a SplitMix64 stream keyed by `(frame, sample)` so the
//! same dataset is produced on every platform without an RNG dependency.

use crate::Real;

/// Scalar offsets applied along an edge normal.
///
/// Inliers receive a uniform offset in `[-max_abs_px, +max_abs_px]`. A fraction
/// `outlier_fraction` of samples is instead displaced by `±outlier_px`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeOffsetNoise {
    pub seed: u64,
    pub max_abs_px: Real,
    pub outlier_fraction: Real,
    pub outlier_px: Real,
}

impl Default for EdgeOffsetNoise {
    fn default() -> Self {
        Self {
            seed: 0,
            max_abs_px: 0.0,
            outlier_fraction: 0.0,
            outlier_px: 0.0,
        }
    }
}

impl EdgeOffsetNoise {
    /// Whether the `(frame_idx, sample_idx)` observation is drawn as an outlier.
    pub fn is_outlier(&self, frame_idx: usize, sample_idx: usize) -> bool {
        if self.outlier_fraction <= 0.0 {
            return false;
        }
        let key = mix_key(self.seed ^ 0x5DEE_CE66_D1A4_F87B, frame_idx, sample_idx);
        u64_to_unit_f64(splitmix64(key)) < self.outlier_fraction
    }

    /// Signed offset in pixels for one observation.
    pub fn offset(&self, frame_idx: usize, sample_idx: usize) -> Real {
        let key = mix_key(self.seed, frame_idx, sample_idx);
        let u = u64_to_unit_f64(splitmix64(key));
        if self.is_outlier(frame_idx, sample_idx) {
            let sign = if u < 0.5 { -1.0 } else { 1.0 };
            return sign * self.outlier_px.abs();
        }
        let max_abs = self.max_abs_px.abs();
        if max_abs == 0.0 {
            return 0.0;
        }
        (u - 0.5) * 2.0 * max_abs
    }
}

#[inline]
fn mix_key(seed: u64, frame_idx: usize, sample_idx: usize) -> u64 {
    seed ^ (frame_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (sample_idx as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Top 53 bits mapped to `[0, 1)`.
#[inline]
fn u64_to_unit_f64(x: u64) -> Real {
    ((x >> 11) as Real) * (1.0 / ((1u64 << 53) as Real))
}
