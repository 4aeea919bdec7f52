use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub enum ParamValue {
  F32(f32),
  Bool(bool),
}

impl ParamValue {
  pub fn as_f32(self) -> f32 {
    match self { ParamValue::F32(v) => v, ParamValue::Bool(b) => if b { 1.0 } else { 0.0 } }
  }
  pub fn as_bool(self) -> bool {
    match self { ParamValue::F32(v) => v >= 0.5, ParamValue::Bool(b) => b }
  }
}

/// Control-thread to audio-thread messages, drained at the top of each block.
#[derive(Clone, Debug, Deserialize)]
pub enum EngineMsg {
  SetParam { path: String, value: ParamValue },
  /// Inject a one-sample impulse into `channel` on the next block.
  Ping { channel: usize, gain: f32 },
  Transport { playing: bool },
  Quit,
}
