use anyhow::{anyhow, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{error, info, warn};

use super::block::InterleavedBlock;
use super::fdn::EngineConfig;
use super::matrices::RoutingTable;
use super::messages::EngineMsg;
use super::processor::FdnProcessor;

/// Fixed device buffer; also the block size the engine is prepared with.
const DEVICE_BLOCK: u32 = 1024;
/// Upper bound on control messages handled per callback.
const MAX_MSGS_PER_BLOCK: usize = 24;

/// Live output through the default device. The processor moves into the
/// audio callback on `start`; the control side only keeps the sender.
pub struct AudioEngine {
  tx: Sender<EngineMsg>,
  rx: Receiver<EngineMsg>,
  pub sr: f32,
  channels: u16,
  processor: Option<FdnProcessor>,
  stream: Option<cpal::Stream>,
}

fn choose_config(device: &cpal::Device) -> anyhow::Result<cpal::SupportedStreamConfig> {
  // prefer 48000 then 44100, f32, stereo before anything wider
  for sr in [48_000u32, 44_100] {
    for want_stereo in [true, false] {
      let supported = device.supported_output_configs().context("querying output configs")?;
      for cfg_range in supported {
        if cfg_range.sample_format() != cpal::SampleFormat::F32 { continue; }
        if want_stereo && cfg_range.channels() != 2 { continue; }
        if cfg_range.min_sample_rate().0 <= sr && cfg_range.max_sample_rate().0 >= sr {
          return Ok(cfg_range.with_sample_rate(cpal::SampleRate(sr)));
        }
      }
    }
  }
  device.default_output_config().context("no usable output config")
}

impl AudioEngine {
  pub fn new(table: RoutingTable, config: EngineConfig) -> anyhow::Result<Self> {
    let (tx, rx) = unbounded();
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| anyhow!("no output device"))?;
    let config_out = choose_config(&device)?;
    let sr = config_out.sample_rate().0 as f32;
    Ok(Self {
      tx,
      rx,
      sr,
      channels: config_out.channels(),
      processor: Some(FdnProcessor::new(table, config)?),
      stream: None,
    })
  }

  pub fn start(&mut self) -> anyhow::Result<()> {
    if self.stream.is_some() { return Ok(()); }
    let mut processor = self.processor.take().ok_or_else(|| anyhow!("engine already consumed"))?;
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| anyhow!("no output device"))?;
    let config = choose_config(&device)?;
    if config.sample_format() != cpal::SampleFormat::F32 {
      return Err(anyhow!("device only offers {:?} output", config.sample_format()));
    }
    let mut cfg: cpal::StreamConfig = config.into();
    cfg.buffer_size = cpal::BufferSize::Fixed(DEVICE_BLOCK);
    self.sr = cfg.sample_rate.0 as f32;
    self.channels = cfg.channels;
    processor.prepare_to_play(self.sr, DEVICE_BLOCK as usize)?;

    let rx = self.rx.clone();
    let channels = cfg.channels as usize;
    let mut playing = true;
    let mut pending_ping: Option<(usize, f32)> = None;
    let err_fn = |e: cpal::StreamError| error!("stream error: {e}");
    let stream = device.build_output_stream(&cfg, move |data: &mut [f32], _| {
      // Drain messages without blocking (tight cap to avoid starving audio)
      for _ in 0..MAX_MSGS_PER_BLOCK {
        match rx.try_recv() {
          Ok(msg) => apply_msg(&mut processor, msg, &mut playing, &mut pending_ping),
          Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
      }
      data.iter_mut().for_each(|s| *s = 0.0);
      if !playing { return; }
      if let Some((ch, gain)) = pending_ping.take() {
        if let Some(s) = data.get_mut(ch.min(channels - 1)) { *s = gain; }
      }
      processor.process_block(&mut InterleavedBlock::new(data, channels), channels);
    }, err_fn, None).context("building output stream")?;
    stream.play().context("starting output stream")?;
    info!("audio started: {} Hz, {} channels", self.sr, self.channels);
    self.stream = Some(stream);
    Ok(())
  }

  pub fn stop(&mut self) {
    if self.stream.take().is_some() { info!("audio stopped"); }
  }

  pub fn sender(&self) -> Sender<EngineMsg> { self.tx.clone() }
  pub fn channels(&self) -> u16 { self.channels }
}

fn apply_msg(processor: &mut FdnProcessor, msg: EngineMsg, playing: &mut bool, pending_ping: &mut Option<(usize, f32)>) {
  match msg {
    EngineMsg::SetParam { path, value } => {
      if !processor.set_param(&path, value) { warn!("unknown parameter {path}"); }
    }
    EngineMsg::Ping { channel, gain } => { *pending_ping = Some((channel, gain)); }
    EngineMsg::Transport { playing: p } => { *playing = p; }
    EngineMsg::Quit => { *playing = false; }
  }
}
