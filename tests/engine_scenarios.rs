use std::collections::HashSet;

use tvfdn::engine::dsp::absorption::AbsorptionFilterBank;
use tvfdn::engine::dsp::delay::DelayBank;
use tvfdn::engine::messages::ParamValue;
use tvfdn::engine::params::{ABSORPTION_BYPASSED, DELAY_FACTOR, RT_DC, RT_NY, TV_BYPASSED};
use tvfdn::{EngineConfig, FdnEngine, FdnParams, FdnProcessor, FeedbackKind, PlanarBlock, ProcessSpec, RoutingTable, N};

const SR: f32 = 48000.0;
const BLOCK: usize = 256;

fn prepared_engine() -> FdnEngine {
  let mut engine = FdnEngine::with_defaults().unwrap();
  engine.prepare(ProcessSpec { sample_rate: SR, block_size: BLOCK }, SR).unwrap();
  engine
}

/// Impulse into channel 0, then silence. Returns per-sample output frames.
fn run_impulse(engine: &mut FdnEngine, params: &FdnParams, total: usize) -> Vec<[f32; N]> {
  let mut frames = Vec::with_capacity(total);
  let mut chans = vec![vec![0.0f32; BLOCK]; N];
  let mut pos = 0;
  while pos < total {
    for c in chans.iter_mut() {
      c.iter_mut().for_each(|s| *s = 0.0);
    }
    if pos == 0 {
      chans[0][0] = 1.0;
    }
    engine.process(&mut PlanarBlock::new(&mut chans), params);
    for i in 0..BLOCK {
      let mut f = [0.0; N];
      for (ch, v) in f.iter_mut().enumerate() {
        *v = chans[ch][i];
      }
      frames.push(f);
    }
    pos += BLOCK;
  }
  frames.truncate(total);
  frames
}

fn frame_energy(f: &[f32; N]) -> f32 { f.iter().map(|x| x * x).sum() }

fn window_energy(frames: &[[f32; N]]) -> f32 { frames.iter().map(frame_energy).sum() }

#[test]
fn impulse_arrives_after_shortest_delay() {
  let mut engine = prepared_engine();
  let min = engine.table().min_delay() as usize;
  let max = engine.table().max_delay() as usize;
  let params = FdnParams { tv_bypassed: true, absorption_bypassed: true, ..FdnParams::default() };
  let frames = run_impulse(&mut engine, &params, 4 * max);

  assert!(frames[..min].iter().all(|f| f.iter().all(|&s| s == 0.0)));
  assert!(frames[min].iter().any(|&s| s != 0.0));
  assert!(window_energy(&frames[min..]) > 0.0);
}

#[test]
fn lossless_bypass_path_stays_bounded() {
  let mut engine = prepared_engine();
  let max = engine.table().max_delay() as usize;
  let params = FdnParams { tv_bypassed: true, absorption_bypassed: true, ..FdnParams::default() };
  let frames = run_impulse(&mut engine, &params, 3 * max);

  // an orthogonal feedback matrix can only move the injected unit of energy around
  for f in frames.iter() {
    assert!(f.iter().all(|s| s.is_finite()));
    assert!(frame_energy(f) <= 1.0 + 1e-3);
  }
}

#[test]
fn structured_feedback_matrices_stay_bounded() {
  for kind in [FeedbackKind::Householder, FeedbackKind::Hadamard] {
    let mut engine = FdnEngine::new(RoutingTable::with_feedback(kind), EngineConfig::default()).unwrap();
    engine.prepare(ProcessSpec { sample_rate: SR, block_size: BLOCK }, SR).unwrap();
    let max = engine.table().max_delay() as usize;
    let params = FdnParams { tv_bypassed: true, absorption_bypassed: true, ..FdnParams::default() };
    let frames = run_impulse(&mut engine, &params, 2 * max);
    assert!(frames.iter().all(|f| frame_energy(f) <= 1.0 + 1e-3), "{kind:?}");
    assert!(window_energy(&frames) > 0.0, "{kind:?}");
  }
}

#[test]
fn absorption_makes_the_tail_decay() {
  for tv_bypassed in [true, false] {
    let mut engine = prepared_engine();
    let max = engine.table().max_delay() as usize;
    let params = FdnParams { rt_dc: 0.5, rt_nyquist: 0.5, tv_bypassed, ..FdnParams::default() };
    let total = 5 * max;
    let frames = run_impulse(&mut engine, &params, total);
    let first = window_energy(&frames[..max]);
    let last = window_energy(&frames[total - max..]);
    assert!(first > 0.0);
    assert!(last < first * 1e-2, "tv_bypassed={tv_bypassed}: first {first}, last {last}");
  }
}

#[test]
fn delay_factor_stretches_arrival() {
  let mut engine = prepared_engine();
  let min = engine.table().min_delay() as usize;
  let params = FdnParams { tv_bypassed: true, absorption_bypassed: true, delay_factor: 2.0, ..FdnParams::default() };
  let frames = run_impulse(&mut engine, &params, 2 * min + 1);
  assert!(frames[..2 * min].iter().all(|f| f.iter().all(|&s| s == 0.0)));
  assert!(frames[2 * min].iter().any(|&s| s != 0.0));
}

#[test]
fn repeated_delay_factor_changes_nothing() {
  let delays = [37.0; N];
  let mut once = DelayBank::new(&delays);
  let mut twice = DelayBank::new(&delays);
  once.prepare(SR, 1000);
  twice.prepare(SR, 1000);
  once.update_delay_factor(1.5);
  twice.update_delay_factor(1.5);
  twice.update_delay_factor(1.5);
  assert_eq!(once.retune_count(), twice.retune_count());

  let mut a = [0.0; N];
  let mut b = [0.0; N];
  for n in 0..200 {
    once.pop_all(&mut a);
    twice.pop_all(&mut b);
    assert_eq!(a, b);
    let x = [(n as f32 * 0.1).sin(); N];
    once.push_all(&x);
    twice.push_all(&x);
  }
}

#[test]
fn absorption_recomputes_at_most_once_per_distinct_tuple() {
  let mut bank = AbsorptionFilterBank::new(&[1000.0; N]);
  bank.prepare(SR);
  let start = bank.recompute_count();
  let tuples: [(f32, f32, f32, f32); 8] = [
    (3.0, 1.5, 1000.0, 1.0),
    (3.0, 1.5, 1000.0, 1.0),
    (3.0, 1.5, 2000.0, 1.0),
    (3.0, 1.5, 2000.0, 1.0),
    (3.0, 1.5, 2000.0, 1.0),
    (4.0, 1.5, 2000.0, 1.0),
    (4.0, 1.5, 2000.0, 2.5),
    (4.0, 1.5, 2000.0, 2.5),
  ];
  let mut distinct = HashSet::new();
  for &(dc, ny, xo, df) in tuples.iter() {
    bank.update_coefficients(dc, ny, xo, df);
    distinct.insert([dc, ny, xo, df].map(|v: f32| v.to_bits()));
  }
  let recomputes = bank.recompute_count() - start;
  assert!(recomputes as usize <= distinct.len());
  assert_eq!(recomputes, 4);
}

#[test]
fn second_prepare_does_not_reconfigure() {
  let mut p = FdnProcessor::with_defaults().unwrap();
  assert!(p.prepare_to_play(48000.0, 512).unwrap());
  let retunes = p.engine().delay_bank().retune_count();
  assert!(!p.prepare_to_play(96000.0, 128).unwrap());
  assert_eq!(p.engine().spec().unwrap().sample_rate, 48000.0);
  assert_eq!(p.engine().delay_bank().retune_count(), retunes);
}

#[test]
fn processor_runs_host_parameters() {
  let mut p = FdnProcessor::with_defaults().unwrap();
  p.prepare_to_play(SR, BLOCK).unwrap();
  p.set_param(TV_BYPASSED, ParamValue::Bool(true));
  p.set_param(ABSORPTION_BYPASSED, ParamValue::Bool(false));
  p.set_param(RT_DC, ParamValue::F32(2.0));
  p.set_param(RT_NY, ParamValue::F32(1.0));
  p.set_param(DELAY_FACTOR, ParamValue::F32(1.0));

  let mut chans = vec![vec![0.0f32; BLOCK]; 2];
  chans[0][0] = 1.0;
  let mut heard = false;
  for _ in 0..8 {
    p.process_block(&mut PlanarBlock::new(&mut chans), 2);
    heard |= chans.iter().flatten().any(|&s| s != 0.0);
    assert!(chans.iter().flatten().all(|s| s.is_finite()));
    for c in chans.iter_mut() {
      c.iter_mut().for_each(|s| *s = 0.0);
    }
  }
  assert!(heard);
  assert!(p.last_params().tv_bypassed);
}
