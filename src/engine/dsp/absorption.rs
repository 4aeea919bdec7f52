//! Per-line absorption: one first-order shelf per delay line, shaped so the
//! loop loses exactly enough energy per pass to hit the requested decay
//! times at DC and at Nyquist.

use std::f32::consts::PI;

use log::debug;

use super::Frame;
use crate::engine::matrices::N;

/// Cross-over floor; lower values make the shelf degenerate.
pub const MIN_CROSSOVER_HZ: f32 = 500.0;

#[inline]
fn rt60_to_slope(rt60: f32, fs: f32) -> f32 { -60.0 / (rt60 * fs) }

#[inline]
fn db_to_gain(db: f32) -> f32 { 10f32.powf(db / 20.0) }

/// One-pole/one-zero IIR in transposed direct form II, coefficients
/// normalized by `a0`.
#[derive(Clone, Copy, Debug)]
pub struct FirstOrderFilter {
  b0: f32,
  b1: f32,
  a1: f32,
  s: f32,
}

impl FirstOrderFilter {
  pub fn new() -> Self { Self { b0: 1.0, b1: 0.0, a1: 0.0, s: 0.0 } }

  pub fn set_coefficients(&mut self, b0: f32, b1: f32, a0: f32, a1: f32) {
    let inv = 1.0 / a0;
    self.b0 = b0 * inv;
    self.b1 = b1 * inv;
    self.a1 = a1 * inv;
  }

  pub fn coefficients(&self) -> [f32; 3] { [self.b0, self.b1, self.a1] }

  pub fn reset(&mut self) { self.s = 0.0; }

  #[inline]
  pub fn process(&mut self, x: f32) -> f32 {
    let y = self.b0 * x + self.s;
    self.s = self.b1 * x - self.a1 * y;
    // keep denormals out of the feedback path
    if self.s.abs() < 1e-8 { self.s = 0.0; }
    y
  }
}

impl Default for FirstOrderFilter {
  fn default() -> Self { Self::new() }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct ShelfSettings {
  rt_dc: f32,
  rt_nyquist: f32,
  crossover_hz: f32,
  delay_factor: f32,
}

pub struct AbsorptionFilterBank {
  filters: Vec<FirstOrderFilter>,
  delays: Frame,
  fs: f32,
  cached: Option<ShelfSettings>,
  recomputes: u64,
}

impl AbsorptionFilterBank {
  pub fn new(delays: &Frame) -> Self {
    Self {
      filters: (0..N).map(|_| FirstOrderFilter::new()).collect(),
      delays: *delays,
      fs: 48000.0,
      cached: None,
      recomputes: 0,
    }
  }

  /// Sets the filter rate, designs a neutral starting shelf and clears state.
  pub fn prepare(&mut self, filter_sample_rate: f32) {
    self.fs = filter_sample_rate;
    self.cached = None;
    self.update_coefficients(2.0, 2.0, 1000.0, 1.0);
    for f in self.filters.iter_mut() {
      f.reset();
    }
  }

  /// The cross-over actually used for a requested one: at most fs/5 (the
  /// discretized shelf goes unstable approaching fs/4), at least 500 Hz.
  pub fn effective_crossover(&self, crossover_hz: f32) -> f32 {
    crossover_hz.min(self.fs / 5.0).max(MIN_CROSSOVER_HZ)
  }

  /// Redesigns all N shelves, but only when one of the four inputs differs
  /// from the previous call. Returns whether a redesign happened.
  pub fn update_coefficients(&mut self, rt_dc: f32, rt_nyquist: f32, crossover_hz: f32, delay_factor: f32) -> bool {
    let settings = ShelfSettings { rt_dc, rt_nyquist, crossover_hz, delay_factor };
    if self.cached == Some(settings) { return false; }
    self.cached = Some(settings);
    self.recomputes += 1;

    let crossover = self.effective_crossover(crossover_hz);
    let t = (crossover / self.fs * 2.0 * PI).tan();
    let slope_dc = rt60_to_slope(rt_dc, self.fs);
    let slope_ny = rt60_to_slope(rt_nyquist, self.fs);

    for (filter, &delay) in self.filters.iter_mut().zip(self.delays.iter()) {
      let len = delay_factor * delay;
      let h_dc = db_to_gain(len * slope_dc);
      let h_ny = db_to_gain(len * slope_ny);
      let k = (h_dc / h_ny).sqrt();

      let b0 = (t * k + 1.0) * h_ny;
      let b1 = (t * k - 1.0) * h_ny;
      let a0 = t / k + 1.0;
      let a1 = t / k - 1.0;
      filter.set_coefficients(b0, b1, a0, a1);
    }
    debug!(
      "absorption redesigned: rt_dc {rt_dc} s, rt_ny {rt_nyquist} s, crossover {crossover} Hz, factor {delay_factor}"
    );
    true
  }

  #[inline]
  pub fn filter(&mut self, input: &Frame, out: &mut Frame) {
    for ((o, &x), f) in out.iter_mut().zip(input.iter()).zip(self.filters.iter_mut()) {
      *o = f.process(x);
    }
  }

  pub fn filter_coefficients(&self, line: usize) -> [f32; 3] { self.filters[line].coefficients() }
  /// Number of full coefficient redesigns so far.
  pub fn recompute_count(&self) -> u64 { self.recomputes }
}
