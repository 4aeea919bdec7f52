//! Real-time 64-channel feedback delay network reverb with frequency
//! dependent absorption and time-varying spectral modulation of the
//! feedback path.

pub mod engine {
  pub mod error;
  pub mod messages;
  pub mod params;
  pub mod matrices;
  pub mod block;
  pub mod dsp;
  pub mod fdn;
  pub mod processor;
  pub mod render;
  #[cfg(feature = "device")]
  pub mod audio;
}
#[cfg(feature = "device")]
pub mod commands;

pub use engine::block::{AudioBlock, InterleavedBlock, PlanarBlock};
pub use engine::error::{FdnError, Result};
pub use engine::fdn::{EngineConfig, FdnEngine, ProcessSpec};
pub use engine::matrices::{FeedbackKind, RoutingTable, N};
pub use engine::params::FdnParams;
pub use engine::processor::FdnProcessor;
