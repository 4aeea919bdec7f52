//! Host-facing wrapper around [`FdnEngine`]: owns the parameter store, takes
//! the per-block parameter snapshot and guards preparation.

use log::{info, warn};

use super::block::AudioBlock;
use super::error::Result;
use super::fdn::{EngineConfig, FdnEngine, ProcessSpec};
use super::matrices::{RoutingTable, N};
use super::messages::ParamValue;
use super::params::{FdnParamKeys, FdnParams, ParamStore};

pub struct FdnProcessor {
  engine: FdnEngine,
  params: ParamStore,
  keys: FdnParamKeys,
  prepare_calls: u32,
  last_params: FdnParams,
}

impl FdnProcessor {
  pub fn new(table: RoutingTable, config: EngineConfig) -> Result<Self> {
    Ok(Self {
      engine: FdnEngine::new(table, config)?,
      params: ParamStore::new(),
      keys: FdnParamKeys::new(),
      prepare_calls: 0,
      last_params: FdnParams::default(),
    })
  }

  pub fn with_defaults() -> Result<Self> { Self::new(RoutingTable::default(), EngineConfig::default()) }

  /// Prepares the engine on the first call only. Later calls, even with a
  /// different rate or block size, are counted and ignored; returns whether
  /// this call prepared the engine.
  pub fn prepare_to_play(&mut self, sample_rate: f32, block_size: usize) -> Result<bool> {
    self.prepare_calls += 1;
    if self.prepare_calls > 1 {
      if let Some(current) = self.engine.spec() {
        if current.sample_rate != sample_rate || current.block_size != block_size {
          warn!(
            "ignoring prepare at {sample_rate} Hz / {block_size} (engine stays at {} Hz / {})",
            current.sample_rate, current.block_size
          );
        }
      }
      return Ok(false);
    }
    let spec = ProcessSpec { sample_rate, block_size };
    if let Err(e) = self.engine.prepare(spec, sample_rate) {
      // allow a retry after a rejected configuration
      self.prepare_calls = 0;
      return Err(e);
    }
    info!("processor ready: {N} in / {N} out");
    Ok(true)
  }

  /// Returns false for unknown parameter paths.
  pub fn set_param(&mut self, path: &str, value: ParamValue) -> bool { self.params.set(path, value) }

  /// Processes one host block in place: output channels with no matching
  /// input are cleared, parameters are snapshotted, then the engine runs.
  pub fn process_block<B: AudioBlock + ?Sized>(&mut self, block: &mut B, num_inputs: usize) {
    for ch in num_inputs..block.num_channels() {
      block.clear_channel(ch);
    }
    let snapshot = FdnParams::from_store(&self.params, &self.keys);
    self.last_params = snapshot;
    self.engine.process(block, &snapshot);
  }

  /// Longest decay time of the current settings.
  pub fn tail_length_seconds(&self) -> f64 {
    FdnParams::from_store(&self.params, &self.keys).longest_decay() as f64
  }

  pub fn last_params(&self) -> &FdnParams { &self.last_params }
  pub fn prepare_calls(&self) -> u32 { self.prepare_calls }
  pub fn engine(&self) -> &FdnEngine { &self.engine }
}
