use std::collections::HashMap;

use super::messages::ParamValue;

pub const RT_DC: &str = "RT_DC";
pub const RT_NY: &str = "RT_NY";
pub const RT_CROSSOVER: &str = "RT_CrossOverFrequency";
pub const TV_BYPASSED: &str = "TV Bypassed";
pub const ABSORPTION_BYPASSED: &str = "Absorption Bypassed";
pub const OSC_FREQUENCY: &str = "Osc_Frequency";
pub const DELAY_FACTOR: &str = "Delay_Factor";
pub const FREQUENCY_SPREAD: &str = "Frequency Spread";

/// Declared range of a host parameter. Bools use `min = 0, max = 1, step = 1`.
#[derive(Clone, Copy, Debug)]
pub struct ParamSpec {
  pub path: &'static str,
  pub min: f32,
  pub max: f32,
  pub step: f32,
  pub default: ParamValue,
}

impl ParamSpec {
  /// Clamp to the range and snap to the step grid, anchored at `min`.
  pub fn normalize(&self, v: f32) -> f32 {
    if !v.is_finite() { return self.default.as_f32(); }
    let v = v.clamp(self.min, self.max);
    if self.step <= 0.0 { return v; }
    let snapped = self.min + ((v - self.min) / self.step).round() * self.step;
    snapped.clamp(self.min, self.max)
  }
}

pub static PARAM_SPECS: [ParamSpec; 8] = [
  ParamSpec { path: RT_DC, min: 0.5, max: 10.0, step: 0.1, default: ParamValue::F32(3.0) },
  ParamSpec { path: RT_NY, min: 0.5, max: 10.0, step: 0.1, default: ParamValue::F32(1.5) },
  ParamSpec { path: RT_CROSSOVER, min: 100.0, max: 8000.0, step: 100.0, default: ParamValue::F32(100.0) },
  ParamSpec { path: OSC_FREQUENCY, min: 0.1, max: 10.0, step: 0.1, default: ParamValue::F32(1.0) },
  ParamSpec { path: DELAY_FACTOR, min: 0.5, max: 5.0, step: 0.1, default: ParamValue::F32(1.0) },
  ParamSpec { path: FREQUENCY_SPREAD, min: 0.1, max: 1.0, step: 0.1, default: ParamValue::F32(0.5) },
  ParamSpec { path: TV_BYPASSED, min: 0.0, max: 1.0, step: 1.0, default: ParamValue::Bool(false) },
  ParamSpec { path: ABSORPTION_BYPASSED, min: 0.0, max: 1.0, step: 1.0, default: ParamValue::Bool(false) },
];

pub fn spec_for(path: &str) -> Option<&'static ParamSpec> {
  PARAM_SPECS.iter().find(|s| s.path == path)
}

/// Parameter values keyed by hashed path. Every known path is inserted up
/// front, so `set` on the audio thread only overwrites and never allocates.
#[derive(Clone)]
pub struct ParamStore {
  map_h: HashMap<u64, ParamValue>,
}

impl ParamStore {
  pub fn new() -> Self {
    let mut map_h = HashMap::with_capacity(PARAM_SPECS.len());
    for spec in PARAM_SPECS.iter() {
      map_h.insert(fast_hash(spec.path), spec.default);
    }
    Self { map_h }
  }

  /// Returns false for unknown paths, which are dropped.
  pub fn set(&mut self, path: &str, v: ParamValue) -> bool {
    match self.map_h.get_mut(&fast_hash(path)) {
      Some(slot) => { *slot = v; true }
      None => false,
    }
  }
  pub fn get_f32_h(&self, key: u64, default: f32) -> f32 {
    self.map_h.get(&key).map(|v| v.as_f32()).unwrap_or(default)
  }
  pub fn get_bool_h(&self, key: u64, default: bool) -> bool {
    self.map_h.get(&key).map(|v| v.as_bool()).unwrap_or(default)
  }
}

impl Default for ParamStore {
  fn default() -> Self { Self::new() }
}

#[inline]
fn fast_hash(s: &str) -> u64 {
  // FNV-1a 64-bit
  let mut hash: u64 = 0xcbf29ce484222325; // offset basis
  for b in s.as_bytes() {
    hash ^= *b as u64;
    hash = hash.wrapping_mul(0x100000001b3);
  }
  hash
}

// Helper to expose hash for other modules
pub fn hash_path(path: &str) -> u64 { fast_hash(path) }

#[derive(Clone, Copy, Debug)]
pub struct FdnParamKeys {
  pub rt_dc: u64,
  pub rt_ny: u64,
  pub crossover: u64,
  pub tv_bypassed: u64,
  pub absorption_bypassed: u64,
  pub osc_frequency: u64,
  pub delay_factor: u64,
  pub spread: u64,
}

impl FdnParamKeys {
  pub fn new() -> Self {
    Self {
      rt_dc: hash_path(RT_DC),
      rt_ny: hash_path(RT_NY),
      crossover: hash_path(RT_CROSSOVER),
      tv_bypassed: hash_path(TV_BYPASSED),
      absorption_bypassed: hash_path(ABSORPTION_BYPASSED),
      osc_frequency: hash_path(OSC_FREQUENCY),
      delay_factor: hash_path(DELAY_FACTOR),
      spread: hash_path(FREQUENCY_SPREAD),
    }
  }
}

impl Default for FdnParamKeys {
  fn default() -> Self { Self::new() }
}

/// Block-scoped parameter snapshot. Taken once at the top of a block and
/// never re-read while the block is being processed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FdnParams {
  pub rt_dc: f32,
  pub rt_nyquist: f32,
  pub crossover_hz: f32,
  pub osc_frequency: f32,
  pub spread: f32,
  pub delay_factor: f32,
  pub tv_bypassed: bool,
  pub absorption_bypassed: bool,
}

impl Default for FdnParams {
  fn default() -> Self {
    Self {
      rt_dc: 3.0,
      rt_nyquist: 1.5,
      crossover_hz: 100.0,
      osc_frequency: 1.0,
      spread: 0.5,
      delay_factor: 1.0,
      tv_bypassed: false,
      absorption_bypassed: false,
    }
  }
}

impl FdnParams {
  pub fn from_store(params: &ParamStore, keys: &FdnParamKeys) -> Self {
    let d = Self::default();
    let f = |key: u64, path: &str, default: f32| {
      let v = params.get_f32_h(key, default);
      spec_for(path).map(|s| s.normalize(v)).unwrap_or(v)
    };
    Self {
      rt_dc: f(keys.rt_dc, RT_DC, d.rt_dc),
      rt_nyquist: f(keys.rt_ny, RT_NY, d.rt_nyquist),
      crossover_hz: f(keys.crossover, RT_CROSSOVER, d.crossover_hz),
      osc_frequency: f(keys.osc_frequency, OSC_FREQUENCY, d.osc_frequency),
      spread: f(keys.spread, FREQUENCY_SPREAD, d.spread),
      delay_factor: f(keys.delay_factor, DELAY_FACTOR, d.delay_factor),
      tv_bypassed: params.get_bool_h(keys.tv_bypassed, d.tv_bypassed),
      absorption_bypassed: params.get_bool_h(keys.absorption_bypassed, d.absorption_bypassed),
    }
  }

  /// Longest configured decay, used as the reported tail length.
  pub fn longest_decay(&self) -> f32 { self.rt_dc.max(self.rt_nyquist) }
}
