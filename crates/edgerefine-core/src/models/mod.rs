//! Camera models.

mod intrinsics;

pub use intrinsics::*;
