//! The feedback delay network: delay bank -> absorption -> feedback stage ->
//! back into the delay bank, one sample at a time.

use log::info;

use super::block::AudioBlock;
use super::dsp::absorption::AbsorptionFilterBank;
use super::dsp::delay::DelayBank;
use super::dsp::tv_matrix::SpectralModulator;
use super::dsp::Frame;
use super::error::{FdnError, Result};
use super::matrices::{row_times_matrix, RoutingTable, MAX_DELAY_SAMPLES, N};
use super::params::FdnParams;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
  /// Allocated length of every delay line.
  pub max_delay_samples: usize,
  /// Route input through `in_gains` and build the output from `directs` and
  /// `out_gains`. Off: input goes straight to the lines and the output is the
  /// feedback stage itself.
  pub apply_gain_matrices: bool,
}

impl Default for EngineConfig {
  fn default() -> Self { Self { max_delay_samples: MAX_DELAY_SAMPLES, apply_gain_matrices: false } }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessSpec {
  pub sample_rate: f32,
  pub block_size: usize,
}

/// Working frames, reused every sample.
struct Frames {
  in_samples: Frame,
  in_delays: Frame,
  delay_output: Frame,
  delay_output_filt: Frame,
  feedback_tv: Frame,
  out_samples: Frame,
  mix: Frame,
}

impl Frames {
  fn new() -> Self {
    Self {
      in_samples: [0.0; N],
      in_delays: [0.0; N],
      delay_output: [0.0; N],
      delay_output_filt: [0.0; N],
      feedback_tv: [0.0; N],
      out_samples: [0.0; N],
      mix: [0.0; N],
    }
  }
}

pub struct FdnEngine {
  table: RoutingTable,
  config: EngineConfig,
  delays: DelayBank,
  absorption: AbsorptionFilterBank,
  tv: SpectralModulator,
  frames: Frames,
  spec: Option<ProcessSpec>,
}

fn to_frame(v: &[f32]) -> Frame {
  let mut f = [0.0; N];
  f.copy_from_slice(&v[..N]);
  f
}

impl FdnEngine {
  /// Validates the table; nothing is allocated for audio until `prepare`.
  pub fn new(table: RoutingTable, config: EngineConfig) -> Result<Self> {
    table.validate(config.max_delay_samples)?;
    let delays = to_frame(&table.delays);
    info!(
      "fdn engine: {} lines, delays {}..{} samples, gain matrices {}",
      N,
      table.min_delay(),
      table.max_delay(),
      if config.apply_gain_matrices { "on" } else { "off" }
    );
    Ok(Self {
      delays: DelayBank::new(&delays),
      absorption: AbsorptionFilterBank::new(&delays),
      tv: SpectralModulator::new(),
      frames: Frames::new(),
      spec: None,
      table,
      config,
    })
  }

  pub fn with_defaults() -> Result<Self> { Self::new(RoutingTable::default(), EngineConfig::default()) }

  /// Sizes and resets every stage: delays, then absorption, then the
  /// modulator. Allocates; call off the audio thread.
  pub fn prepare(&mut self, spec: ProcessSpec, filter_sample_rate: f32) -> Result<()> {
    for sr in [spec.sample_rate, filter_sample_rate] {
      if !(sr.is_finite() && sr > 0.0) {
        return Err(FdnError::SampleRate(sr));
      }
    }
    self.frames = Frames::new();
    self.delays.prepare(spec.sample_rate, self.config.max_delay_samples);
    self.absorption.prepare(filter_sample_rate);
    self.tv.prepare(spec.sample_rate);
    self.spec = Some(spec);
    info!("fdn engine prepared at {} Hz, block {}", spec.sample_rate, spec.block_size);
    Ok(())
  }

  /// Runs one block in place. Parameters are applied once up front; the
  /// per-sample loop never looks at them again except for the bypass flags.
  pub fn process<B: AudioBlock + ?Sized>(&mut self, block: &mut B, params: &FdnParams) {
    let channels = block.num_channels();
    if self.spec.is_none() {
      for ch in 0..channels {
        block.clear_channel(ch);
      }
      return;
    }

    self.delays.update_delay_factor(params.delay_factor);
    self.tv.update_oscillators(params.osc_frequency, params.spread);
    self.absorption.update_coefficients(params.rt_dc, params.rt_nyquist, params.crossover_hz, params.delay_factor);

    let f = &mut self.frames;
    for i in 0..block.num_samples() {
      for (ch, x) in f.in_samples.iter_mut().enumerate() {
        *x = block.sample(ch, i);
      }

      if self.config.apply_gain_matrices {
        row_times_matrix(&f.in_samples, &self.table.in_gains, &mut f.in_delays);
      } else {
        f.in_delays = f.in_samples;
      }

      self.delays.pop_all(&mut f.delay_output);

      if params.absorption_bypassed {
        f.delay_output_filt = f.delay_output;
      } else {
        self.absorption.filter(&f.delay_output, &mut f.delay_output_filt);
      }

      if params.tv_bypassed {
        row_times_matrix(&f.delay_output_filt, &self.table.feedback_transposed, &mut f.feedback_tv);
      } else {
        self.tv.filter(&f.delay_output_filt, &mut f.feedback_tv);
      }

      for (d, &fb) in f.in_delays.iter_mut().zip(f.feedback_tv.iter()) {
        *d += fb;
      }
      self.delays.push_all(&f.in_delays);

      if self.config.apply_gain_matrices {
        row_times_matrix(&f.in_samples, &self.table.directs, &mut f.out_samples);
        row_times_matrix(&f.delay_output, &self.table.out_gains, &mut f.mix);
        for (o, &m) in f.out_samples.iter_mut().zip(f.mix.iter()) {
          *o += m;
        }
      } else {
        f.out_samples = f.feedback_tv;
      }

      for (ch, &y) in f.out_samples.iter().enumerate() {
        block.set_sample(ch, i, y);
      }
    }

    for ch in N..channels {
      block.clear_channel(ch);
    }
  }

  pub fn spec(&self) -> Option<ProcessSpec> { self.spec }
  pub fn is_prepared(&self) -> bool { self.spec.is_some() }
  pub fn table(&self) -> &RoutingTable { &self.table }
  pub fn config(&self) -> &EngineConfig { &self.config }
  pub fn delay_bank(&self) -> &DelayBank { &self.delays }
  pub fn absorption(&self) -> &AbsorptionFilterBank { &self.absorption }
  pub fn modulator(&self) -> &SpectralModulator { &self.tv }
}
