//! Time-varying spectral rotation of the feedback frame.
//!
//! Each feedback frame is treated as an N-point real signal across channels:
//! it is transformed, every positive-frequency bin is rotated by the phase of
//! its own free-running oscillator, and the result is transformed back. The
//! rotation is unitary, so the stage moves energy between channels without
//! adding or removing any.

use std::f64::consts::TAU;
use std::sync::Arc;

use log::debug;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use super::Frame;
use crate::engine::matrices::N;

pub const NUM_OSCILLATORS: usize = N / 2;

/// Per-oscillator detune coefficients in [-1, 1].
pub const SPREAD_TABLE: [f64; NUM_OSCILLATORS] = [
  -0.480259, 0.600137, -0.137172, 0.821295, -0.636306, -0.472394, -0.708922, -0.727863,
  0.738584, 0.159409, 0.099720, -0.710090, 0.706062, 0.244110, -0.298095, 0.026499,
  -0.196384, -0.848067, -0.520168, -0.753362, -0.632184, -0.520095, -0.165466, -0.900691,
  0.805432, 0.889574, -0.018272, -0.021495, -0.324561, 0.800108, -0.261506, -0.161506,
];

const FREQUENCY_RAMP_SECONDS: f64 = 0.05;

/// Linear ramp towards the last target, `len` steps per change.
#[derive(Clone, Copy, Debug)]
struct Ramp {
  current: f64,
  target: f64,
  step: f64,
  steps_left: u32,
  len: u32,
}

impl Ramp {
  fn new() -> Self { Self { current: 0.0, target: 0.0, step: 0.0, steps_left: 0, len: 0 } }

  fn reset(&mut self, sr: f64, seconds: f64) {
    self.len = (sr * seconds).floor().max(0.0) as u32;
    self.current = self.target;
    self.steps_left = 0;
  }

  fn set_target(&mut self, target: f64) {
    if target == self.target { return; }
    self.target = target;
    if self.len == 0 {
      self.current = target;
      self.steps_left = 0;
      return;
    }
    self.steps_left = self.len;
    self.step = (self.target - self.current) / self.len as f64;
  }

  #[inline]
  fn next(&mut self) -> f64 {
    if self.steps_left == 0 { return self.target; }
    self.steps_left -= 1;
    if self.steps_left == 0 { self.current = self.target; } else { self.current += self.step; }
    self.current
  }
}

/// Phase accumulator whose output is the phase itself, normalized to [0,1).
#[derive(Clone, Copy, Debug)]
pub struct Oscillator {
  phase: f64,
  freq: Ramp,
  sr: f64,
}

impl Oscillator {
  pub fn new() -> Self { Self { phase: 0.0, freq: Ramp::new(), sr: 48000.0 } }

  pub fn prepare(&mut self, sr: f64) {
    self.sr = sr;
    self.phase = 0.0;
    self.freq = Ramp::new();
    self.freq.reset(sr, FREQUENCY_RAMP_SECONDS);
  }

  pub fn set_frequency(&mut self, hz: f64) { self.freq.set_target(hz); }
  pub fn frequency(&self) -> f64 { self.freq.target }

  /// Current phase, then advance by one step.
  #[inline]
  pub fn next(&mut self) -> f64 {
    let out = self.phase;
    let inc = self.freq.next() / self.sr;
    self.phase = (self.phase + inc).rem_euclid(1.0);
    out
  }
}

impl Default for Oscillator {
  fn default() -> Self { Self::new() }
}

pub struct SpectralModulator {
  oscillators: Vec<Oscillator>,
  fft: Arc<dyn Fft<f32>>,
  ifft: Arc<dyn Fft<f32>>,
  spectrum: Vec<Complex32>,
  scratch: Vec<Complex32>,
  cached: Option<(f32, f32)>,
  retunes: u64,
}

impl SpectralModulator {
  pub fn new() -> Self {
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(N);
    let ifft = planner.plan_fft_inverse(N);
    let scratch_len = fft.get_inplace_scratch_len().max(ifft.get_inplace_scratch_len());
    Self {
      oscillators: (0..NUM_OSCILLATORS).map(|_| Oscillator::new()).collect(),
      fft,
      ifft,
      spectrum: vec![Complex32::new(0.0, 0.0); N],
      scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
      cached: None,
      retunes: 0,
    }
  }

  /// Restarts every oscillator at phase 0 with a slow placeholder tuning;
  /// the first block's parameters ramp them to the real frequencies.
  pub fn prepare(&mut self, sample_rate: f32) {
    for osc in self.oscillators.iter_mut() {
      osc.prepare(sample_rate as f64);
    }
    self.cached = None;
    self.update_oscillators(0.1, 0.1);
  }

  /// Retunes oscillator i to `base * (1 + SPREAD_TABLE[i] * spread)`, only
  /// when either argument changed.
  pub fn update_oscillators(&mut self, base_frequency: f32, spread: f32) -> bool {
    if self.cached == Some((base_frequency, spread)) { return false; }
    self.cached = Some((base_frequency, spread));
    self.retunes += 1;
    let base = base_frequency as f64;
    let spread = spread as f64;
    for (osc, &r) in self.oscillators.iter_mut().zip(SPREAD_TABLE.iter()) {
      osc.set_frequency(base * (1.0 + r * spread));
    }
    debug!("tv oscillators retuned: base {base_frequency} Hz, spread {spread}");
    true
  }

  /// Rotates bins 1..N/2 by their oscillator phases. DC and Nyquist stay
  /// real and untouched; negative bins mirror the positive ones so the
  /// inverse transform stays real.
  pub fn filter(&mut self, input: &Frame, out: &mut Frame) {
    for (c, &x) in self.spectrum.iter_mut().zip(input.iter()) {
      *c = Complex32::new(x, 0.0);
    }
    self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);

    for k in 1..N / 2 {
      let angle = (TAU * self.oscillators[k].next()) as f32;
      let (sin, cos) = angle.sin_cos();
      let c = self.spectrum[k];
      let rotated = Complex32::new(c.re * cos - c.im * sin, c.re * sin + c.im * cos);
      self.spectrum[k] = rotated;
      self.spectrum[N - k] = rotated.conj();
    }

    self.ifft.process_with_scratch(&mut self.spectrum, &mut self.scratch);
    let scale = 1.0 / N as f32;
    for (o, c) in out.iter_mut().zip(self.spectrum.iter()) {
      *o = c.re * scale;
    }
  }

  pub fn oscillator_frequency(&self, i: usize) -> f64 { self.oscillators[i].frequency() }
  pub fn retune_count(&self) -> u64 { self.retunes }
}

impl Default for SpectralModulator {
  fn default() -> Self { Self::new() }
}
