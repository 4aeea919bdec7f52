use log::{info, warn};

use super::Frame;
use crate::engine::matrices::N;

/// Single-tap integer delay line over a circular buffer.
///
/// Read and write pointers advance in lockstep, one step per `pop`/`push`.
/// Popping before pushing within a sample yields the input from exactly
/// `delay` samples ago.
pub struct DelayLine {
  buf: Vec<f32>,
  wr: usize,
  rd: usize,
  delay: usize,
}

impl DelayLine {
  pub fn new() -> Self { Self { buf: Vec::new(), wr: 0, rd: 0, delay: 0 } }

  /// Allocates room for `max_delay` samples and clears the line.
  pub fn prepare(&mut self, max_delay: usize) {
    self.buf = vec![0.0; max_delay + 1];
    self.reset();
  }

  pub fn reset(&mut self) {
    self.buf.iter_mut().for_each(|s| *s = 0.0);
    self.wr = 0;
    self.rd = 0;
  }

  pub fn max_delay(&self) -> usize { self.buf.len().saturating_sub(1) }
  pub fn delay(&self) -> usize { self.delay }

  /// Fractional lengths are truncated. Returns false when the length had to
  /// be clamped to the allocated maximum.
  pub fn set_delay(&mut self, samples: f32) -> bool {
    let max = self.max_delay();
    let wanted = if samples.is_finite() { samples.max(0.0) as usize } else { max };
    debug_assert!(wanted <= max, "delay {wanted} exceeds allocated maximum {max}");
    self.delay = wanted.min(max);
    wanted <= max
  }

  #[inline]
  pub fn pop(&mut self) -> f32 {
    let len = self.buf.len();
    if len == 0 { return 0.0; }
    let y = self.buf[(self.rd + len - self.delay) % len];
    self.rd += 1; if self.rd >= len { self.rd = 0; }
    y
  }

  #[inline]
  pub fn push(&mut self, x: f32) {
    let len = self.buf.len();
    if len == 0 { return; }
    self.buf[self.wr] = x;
    self.wr += 1; if self.wr >= len { self.wr = 0; }
  }
}

impl Default for DelayLine {
  fn default() -> Self { Self::new() }
}

/// The network's N delay lines, each tuned to `base_delay * delay_factor`.
pub struct DelayBank {
  lines: Vec<DelayLine>,
  base_delays: Frame,
  delay_factor: f32,
  retunes: u64,
}

impl DelayBank {
  pub fn new(base_delays: &Frame) -> Self {
    Self {
      lines: (0..N).map(|_| DelayLine::new()).collect(),
      base_delays: *base_delays,
      delay_factor: 1.0,
      retunes: 0,
    }
  }

  pub fn prepare(&mut self, sample_rate: f32, max_delay_samples: usize) {
    for line in self.lines.iter_mut() {
      line.prepare(max_delay_samples);
    }
    self.apply_delays();
    info!(
      "delay bank prepared: {} lines, max {} samples at {} Hz, factor {}",
      N, max_delay_samples, sample_rate, self.delay_factor
    );
  }

  /// Retunes every line only when `factor` differs from the last applied one.
  pub fn update_delay_factor(&mut self, factor: f32) -> bool {
    if factor == self.delay_factor { return false; }
    self.delay_factor = factor;
    self.apply_delays();
    true
  }

  fn apply_delays(&mut self) {
    self.retunes += 1;
    let mut clamped = 0usize;
    for (line, &base) in self.lines.iter_mut().zip(self.base_delays.iter()) {
      if !line.set_delay(self.delay_factor * base) { clamped += 1; }
    }
    if clamped > 0 {
      warn!("{clamped} delay lines clamped to their maximum length");
    }
  }

  #[inline]
  pub fn pop_all(&mut self, out: &mut Frame) {
    for (o, line) in out.iter_mut().zip(self.lines.iter_mut()) {
      *o = line.pop();
    }
  }

  #[inline]
  pub fn push_all(&mut self, frame: &Frame) {
    for (line, &x) in self.lines.iter_mut().zip(frame.iter()) {
      line.push(x);
    }
  }

  pub fn delay_factor(&self) -> f32 { self.delay_factor }
  pub fn delays(&self) -> impl Iterator<Item = usize> + '_ { self.lines.iter().map(|l| l.delay()) }
  /// Number of times the line lengths were recomputed.
  pub fn retune_count(&self) -> u64 { self.retunes }
}
