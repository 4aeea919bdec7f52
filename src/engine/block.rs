/// A host audio buffer the engine reads and writes one sample at a time.
///
/// Channels the block does not have read as silence and writes to them are
/// dropped, so the engine never has to care about the host's channel count.
pub trait AudioBlock {
  fn num_channels(&self) -> usize;
  fn num_samples(&self) -> usize;
  fn sample(&self, channel: usize, index: usize) -> f32;
  fn set_sample(&mut self, channel: usize, index: usize, value: f32);

  fn clear_channel(&mut self, channel: usize) {
    for i in 0..self.num_samples() {
      self.set_sample(channel, i, 0.0);
    }
  }
}

/// One slice per channel.
pub struct PlanarBlock<'a> {
  channels: &'a mut [Vec<f32>],
  len: usize,
}

impl<'a> PlanarBlock<'a> {
  /// The block length is the shortest channel.
  pub fn new(channels: &'a mut [Vec<f32>]) -> Self {
    let len = channels.iter().map(|c| c.len()).min().unwrap_or(0);
    Self { channels, len }
  }
}

impl AudioBlock for PlanarBlock<'_> {
  fn num_channels(&self) -> usize { self.channels.len() }
  fn num_samples(&self) -> usize { self.len }
  #[inline]
  fn sample(&self, channel: usize, index: usize) -> f32 {
    self.channels.get(channel).map(|c| c[index]).unwrap_or(0.0)
  }
  #[inline]
  fn set_sample(&mut self, channel: usize, index: usize, value: f32) {
    if let Some(c) = self.channels.get_mut(channel) { c[index] = value; }
  }
}

/// Frame-interleaved samples, as delivered by audio devices.
pub struct InterleavedBlock<'a> {
  data: &'a mut [f32],
  channels: usize,
}

impl<'a> InterleavedBlock<'a> {
  pub fn new(data: &'a mut [f32], channels: usize) -> Self {
    Self { data, channels: channels.max(1) }
  }
}

impl AudioBlock for InterleavedBlock<'_> {
  fn num_channels(&self) -> usize { self.channels }
  fn num_samples(&self) -> usize { self.data.len() / self.channels }
  #[inline]
  fn sample(&self, channel: usize, index: usize) -> f32 {
    if channel >= self.channels { return 0.0; }
    self.data[index * self.channels + channel]
  }
  #[inline]
  fn set_sample(&mut self, channel: usize, index: usize, value: f32) {
    if channel < self.channels { self.data[index * self.channels + channel] = value; }
  }
}
