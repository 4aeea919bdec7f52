//! Offline rendering: run the engine over a prepared buffer and optionally
//! write selected channels to a WAV file.

use std::path::Path;

use log::info;

use super::block::PlanarBlock;
use super::error::{FdnError, Result};
use super::fdn::{FdnEngine, ProcessSpec};
use super::matrices::N;
use super::params::FdnParams;

const RENDER_BLOCK: usize = 512;

/// Feeds a unit impulse into `channel` of a freshly prepared engine and
/// returns `seconds` of all N output channels.
pub fn render_impulse_response(
  engine: &mut FdnEngine,
  params: &FdnParams,
  channel: usize,
  seconds: f32,
  sample_rate: f32,
) -> Result<Vec<Vec<f32>>> {
  if channel >= N {
    return Err(FdnError::ChannelMismatch { engine: N, host: channel + 1 });
  }
  engine.prepare(ProcessSpec { sample_rate, block_size: RENDER_BLOCK }, sample_rate)?;
  let len = (seconds.max(0.0) * sample_rate) as usize;
  let mut out = vec![vec![0.0f32; len]; N];
  let mut block = vec![vec![0.0f32; RENDER_BLOCK]; N];

  let mut pos = 0;
  while pos < len {
    let n = RENDER_BLOCK.min(len - pos);
    for c in block.iter_mut() {
      c.resize(n, 0.0);
      c.iter_mut().for_each(|s| *s = 0.0);
    }
    if pos == 0 && n > 0 {
      block[channel][0] = 1.0;
    }
    engine.process(&mut PlanarBlock::new(&mut block), params);
    for (dst, src) in out.iter_mut().zip(block.iter()) {
      dst[pos..pos + n].copy_from_slice(src);
    }
    pos += n;
  }
  info!("rendered {len} samples of impulse response from channel {channel}");
  Ok(out)
}

/// Writes the channels as an interleaved 32-bit float WAV, trimmed to the
/// shortest channel.
pub fn write_wav(path: impl AsRef<Path>, channels: &[&[f32]], sample_rate: u32) -> Result<()> {
  if channels.is_empty() || channels.len() > u16::MAX as usize {
    return Err(FdnError::ChannelMismatch { engine: u16::MAX as usize, host: channels.len() });
  }
  let spec = hound::WavSpec {
    channels: channels.len() as u16,
    sample_rate,
    bits_per_sample: 32,
    sample_format: hound::SampleFormat::Float,
  };
  let len = channels.iter().map(|c| c.len()).min().unwrap_or(0);
  let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
  for i in 0..len {
    for c in channels {
      writer.write_sample(c[i])?;
    }
  }
  writer.finalize()?;
  info!("wrote {} ({} frames)", path.as_ref().display(), len);
  Ok(())
}
