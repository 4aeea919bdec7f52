//! Process-wide entry points for driving the live engine from a UI or host
//! shell. The first `start_audio` leaks the engine so its stream lives for
//! the rest of the process; later calls are no-ops.

use anyhow::anyhow;
use crossbeam_channel::Sender;
use once_cell::sync::OnceCell;

use crate::engine::audio::AudioEngine;
use crate::engine::fdn::EngineConfig;
use crate::engine::matrices::RoutingTable;
use crate::engine::messages::{EngineMsg, ParamValue};

static ENGINE_TX: OnceCell<Sender<EngineMsg>> = OnceCell::new();

fn sender() -> anyhow::Result<&'static Sender<EngineMsg>> {
  ENGINE_TX.get().ok_or_else(|| anyhow!("engine not started"))
}

pub fn start_audio(table: RoutingTable, config: EngineConfig) -> anyhow::Result<()> {
  if ENGINE_TX.get().is_some() { return Ok(()); }
  let mut engine = Box::new(AudioEngine::new(table, config)?);
  let tx = engine.sender();
  engine.start()?;
  let _leaked: &'static mut AudioEngine = Box::leak(engine);
  let _ = ENGINE_TX.set(tx);
  Ok(())
}

pub fn stop_audio() -> anyhow::Result<()> {
  if let Some(tx) = ENGINE_TX.get() {
    let _ = tx.send(EngineMsg::Transport { playing: false });
  }
  Ok(())
}

pub fn set_transport(playing: bool) -> anyhow::Result<()> {
  sender()?.send(EngineMsg::Transport { playing })?;
  Ok(())
}

pub fn set_param(path: &str, value: ParamValue) -> anyhow::Result<()> {
  sender()?.send(EngineMsg::SetParam { path: path.to_string(), value })?;
  Ok(())
}

/// Fires a unit impulse into `channel` to audition the tail.
pub fn ping(channel: usize) -> anyhow::Result<()> {
  sender()?.send(EngineMsg::Ping { channel, gain: 1.0 })?;
  Ok(())
}
