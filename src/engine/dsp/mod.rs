pub mod absorption;
pub mod delay;
pub mod tv_matrix;

use super::matrices::N;

/// One sample per network channel, passed between stages each time step.
pub type Frame = [f32; N];
