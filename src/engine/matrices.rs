//! Static routing table of the network: delay lengths and the mixing matrices.
//!
//! Matrices are flattened row-major. The table is loaded once and never
//! mutated; only `delays` and `feedback_transposed` sit in the default signal
//! path, the gain and direct matrices are used when full mixing is enabled.

use std::path::Path;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::error::{FdnError, Result};

/// Channel count shared by every stage of the network.
pub const N: usize = 64;
/// Allocated length of each delay line, in samples.
pub const MAX_DELAY_SAMPLES: usize = 192_000;
/// Upper bound of the `Delay_Factor` parameter.
pub const MAX_DELAY_FACTOR: f32 = 5.0;

const DEFAULT_SEED: u64 = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingTable {
  pub delays: Vec<f32>,
  pub feedback: Vec<f32>,
  /// Derived from `feedback` when missing from the JSON.
  #[serde(default)]
  pub feedback_transposed: Vec<f32>,
  pub in_gains: Vec<f32>,
  pub out_gains: Vec<f32>,
  pub directs: Vec<f32>,
}

/// Orthogonal feedback matrices the default table can be built with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
  RandomOrthogonal { seed: u64 },
  Householder,
  Hadamard,
  Identity,
}

impl FeedbackKind {
  pub fn matrix(self, n: usize) -> Vec<f64> {
    match self {
      FeedbackKind::RandomOrthogonal { seed } => random_orthogonal(n, seed),
      FeedbackKind::Householder => householder(n),
      FeedbackKind::Hadamard => hadamard(n),
      FeedbackKind::Identity => identity(n),
    }
  }
}

impl Default for FeedbackKind {
  fn default() -> Self { FeedbackKind::RandomOrthogonal { seed: DEFAULT_SEED } }
}

impl Default for RoutingTable {
  fn default() -> Self { Self::with_feedback(FeedbackKind::default()) }
}

impl RoutingTable {
  /// Default delays and gains around the given feedback matrix.
  pub fn with_feedback(kind: FeedbackKind) -> Self {
    let feedback = to_f32(&kind.matrix(N));
    Self {
      delays: prime_delays(N, 500.0, 4000.0),
      feedback_transposed: transpose(&feedback, N),
      feedback,
      in_gains: to_f32(&identity(N)),
      out_gains: to_f32(&identity(N)),
      directs: vec![0.0; N * N],
    }
  }

  pub fn from_json(json: &str) -> Result<Self> {
    let mut table: RoutingTable = serde_json::from_str(json)?;
    if table.feedback_transposed.is_empty() && table.feedback.len() == N * N {
      table.feedback_transposed = transpose(&table.feedback, N);
    }
    table.validate(MAX_DELAY_SAMPLES)?;
    Ok(table)
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
    let text = std::fs::read_to_string(path)?;
    Self::from_json(&text)
  }

  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  /// Reject any table the network cannot run: wrong dimensions, delays that
  /// would overflow a line at the largest delay factor, or a transposed
  /// feedback matrix that disagrees with `feedback`.
  pub fn validate(&self, max_delay_samples: usize) -> Result<()> {
    check_len("delays", &self.delays, N)?;
    check_len("feedback", &self.feedback, N * N)?;
    check_len("feedback_transposed", &self.feedback_transposed, N * N)?;
    check_len("in_gains", &self.in_gains, N * N)?;
    check_len("out_gains", &self.out_gains, N * N)?;
    check_len("directs", &self.directs, N * N)?;

    let limit = max_delay_samples as f32 / MAX_DELAY_FACTOR;
    for (index, &value) in self.delays.iter().enumerate() {
      if !value.is_finite() || value < 0.0 || value > limit {
        return Err(FdnError::InvalidDelay { index, value });
      }
    }

    for i in 0..N {
      for j in 0..N {
        if (self.feedback[i * N + j] - self.feedback_transposed[j * N + i]).abs() > 1e-6 {
          return Err(FdnError::NotTransposed);
        }
      }
    }
    Ok(())
  }

  pub fn min_delay(&self) -> f32 {
    self.delays.iter().copied().fold(f32::INFINITY, f32::min)
  }

  pub fn max_delay(&self) -> f32 {
    self.delays.iter().copied().fold(0.0, f32::max)
  }
}

fn check_len(what: &'static str, v: &[f32], expected: usize) -> Result<()> {
  if v.len() != expected {
    return Err(FdnError::Dimension { what, expected, actual: v.len() });
  }
  Ok(())
}

fn to_f32(m: &[f64]) -> Vec<f32> { m.iter().map(|&v| v as f32).collect() }

/// `out = row × m` for a 1×rows row vector and a rows×cols matrix.
#[inline]
pub fn row_times_matrix(row: &[f32], m: &[f32], out: &mut [f32]) {
  let cols = out.len();
  debug_assert_eq!(row.len() * cols, m.len());
  out.iter_mut().for_each(|o| *o = 0.0);
  for (i, &x) in row.iter().enumerate() {
    if x == 0.0 { continue; }
    let m_row = &m[i * cols..(i + 1) * cols];
    for (o, &g) in out.iter_mut().zip(m_row) {
      *o += x * g;
    }
  }
}

pub fn transpose(m: &[f32], n: usize) -> Vec<f32> {
  let mut t = vec![0.0; n * n];
  for i in 0..n {
    for j in 0..n {
      t[j * n + i] = m[i * n + j];
    }
  }
  t
}

/// `count` distinct primes spread geometrically over `[lo, hi]`.
pub fn prime_delays(count: usize, lo: f32, hi: f32) -> Vec<f32> {
  let mut out = Vec::with_capacity(count);
  let mut prev = 0u32;
  for i in 0..count {
    let t = if count > 1 { i as f32 / (count - 1) as f32 } else { 0.0 };
    let target = (lo * (hi / lo).powf(t)).round() as u32;
    let p = next_prime(target.max(prev + 1));
    out.push(p as f32);
    prev = p;
  }
  out
}

fn next_prime(mut n: u32) -> u32 {
  loop {
    if is_prime(n) { return n; }
    n += 1;
  }
}

fn is_prime(n: u32) -> bool {
  if n < 2 { return false; }
  let mut d = 2;
  while d * d <= n {
    if n % d == 0 { return false; }
    d += 1;
  }
  true
}

/// Identity matrix.
pub fn identity(n: usize) -> Vec<f64> {
  let mut m = vec![0.0; n * n];
  for i in 0..n {
    m[i * n + i] = 1.0;
  }
  m
}

/// Householder reflection: A = I - (2/N) * ones * ones^T
pub fn householder(n: usize) -> Vec<f64> {
  let mut m = vec![0.0; n * n];
  let scale = 2.0 / n as f64;
  for i in 0..n {
    for j in 0..n {
      m[i * n + j] = if i == j { 1.0 - scale } else { -scale };
    }
  }
  m
}

/// Normalized Hadamard matrix. Requires n = power of 2.
pub fn hadamard(n: usize) -> Vec<f64> {
  assert!(n > 0 && (n & (n - 1)) == 0, "n must be power of 2, got {n}");
  if n == 1 {
    return vec![1.0];
  }
  let half = n / 2;
  let h = hadamard(half);
  let inv_sqrt2 = 1.0 / 2.0_f64.sqrt();
  let mut m = vec![0.0; n * n];
  for i in 0..half {
    for j in 0..half {
      let v = h[i * half + j] * inv_sqrt2;
      m[i * n + j] = v;
      m[i * n + half + j] = v;
      m[(half + i) * n + j] = v;
      m[(half + i) * n + half + j] = -v;
    }
  }
  m
}

/// Random orthogonal matrix: Gaussian entries from a seeded ChaCha8 stream,
/// Householder QR, then columns flipped so that diag(R) is positive.
pub fn random_orthogonal(n: usize, seed: u64) -> Vec<f64> {
  let mut rng = ChaCha8Rng::seed_from_u64(seed);

  // Box-Muller
  let mut a = vec![0.0f64; n * n];
  for v in a.iter_mut() {
    let u1: f64 = loop {
      let u: f64 = rng.random();
      if u > 0.0 { break u; }
    };
    let u2: f64 = rng.random();
    *v = (-2.0_f64 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
  }

  let (mut q, r) = qr_decomposition(&a, n);
  for j in 0..n {
    if r[j * n + j] < 0.0 {
      for i in 0..n {
        q[i * n + j] = -q[i * n + j];
      }
    }
  }
  q
}

fn qr_decomposition(a: &[f64], n: usize) -> (Vec<f64>, Vec<f64>) {
  let mut r = a.to_vec();
  let mut q = identity(n);

  for k in 0..n {
    let mut x: Vec<f64> = (k..n).map(|i| r[i * n + k]).collect();

    let norm_x = x.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm_x < 1e-15 {
      continue;
    }
    let sign = if x[0] >= 0.0 { 1.0 } else { -1.0 };
    x[0] += sign * norm_x;
    let norm_v = x.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm_v < 1e-15 {
      continue;
    }
    for v in x.iter_mut() {
      *v /= norm_v;
    }

    // R <- H R (rows k..n)
    for j in k..n {
      let dot: f64 = (k..n).map(|i| x[i - k] * r[i * n + j]).sum();
      for i in k..n {
        r[i * n + j] -= 2.0 * x[i - k] * dot;
      }
    }

    // Q <- Q H (columns k..n)
    for i in 0..n {
      let dot: f64 = (k..n).map(|j| q[i * n + j] * x[j - k]).sum();
      for j in k..n {
        q[i * n + j] -= 2.0 * dot * x[j - k];
      }
    }
  }

  (q, r)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gram_is_identity(m: &[f64], n: usize, tol: f64) -> bool {
    for i in 0..n {
      for j in 0..n {
        let dot: f64 = (0..n).map(|k| m[i * n + k] * m[j * n + k]).sum();
        let expected = if i == j { 1.0 } else { 0.0 };
        if (dot - expected).abs() > tol {
          return false;
        }
      }
    }
    true
  }

  #[test]
  fn test_default_table_is_valid() {
    let t = RoutingTable::default();
    t.validate(MAX_DELAY_SAMPLES).unwrap();
    assert_eq!(t.delays.len(), N);
    assert_eq!(t.min_delay(), 503.0);
    assert!(t.max_delay() <= 4100.0);
  }

  #[test]
  fn test_default_delays_are_distinct_primes() {
    let d = prime_delays(N, 500.0, 4000.0);
    for w in d.windows(2) {
      assert!(w[1] > w[0]);
    }
    assert!(d.iter().all(|&v| is_prime(v as u32)));
  }

  #[test]
  fn test_orthogonal_constructors() {
    assert!(gram_is_identity(&householder(8), 8, 1e-10));
    assert!(gram_is_identity(&hadamard(64), 64, 1e-10));
    assert!(gram_is_identity(&random_orthogonal(N, 7), N, 1e-8));
  }

  #[test]
  fn test_every_feedback_kind_builds_a_valid_table() {
    for kind in [
      FeedbackKind::default(),
      FeedbackKind::RandomOrthogonal { seed: 3 },
      FeedbackKind::Householder,
      FeedbackKind::Hadamard,
      FeedbackKind::Identity,
    ] {
      let t = RoutingTable::with_feedback(kind);
      t.validate(MAX_DELAY_SAMPLES).unwrap();
      assert!(gram_is_identity(&kind.matrix(N), N, 1e-8), "{kind:?}");
    }
    assert_eq!(RoutingTable::with_feedback(FeedbackKind::default()), RoutingTable::default());
    let h = RoutingTable::with_feedback(FeedbackKind::Householder);
    assert!((h.feedback[0] - (1.0 - 2.0 / N as f32)).abs() < 1e-6);
  }

  #[test]
  fn test_feedback_kind_from_json() {
    let kind: FeedbackKind = serde_json::from_str(r#"{"random_orthogonal":{"seed":9}}"#).unwrap();
    assert_eq!(kind, FeedbackKind::RandomOrthogonal { seed: 9 });
    let kind: FeedbackKind = serde_json::from_str(r#""hadamard""#).unwrap();
    assert_eq!(kind, FeedbackKind::Hadamard);
  }

  #[test]
  fn test_random_orthogonal_is_deterministic() {
    assert_eq!(random_orthogonal(16, 42), random_orthogonal(16, 42));
    assert_ne!(random_orthogonal(16, 42), random_orthogonal(16, 137));
  }

  #[test]
  fn test_row_times_matrix_uses_rows() {
    // row e1 picks out row 1 of the matrix
    let m = vec![1.0, 2.0, 3.0, 4.0];
    let mut out = [0.0; 2];
    row_times_matrix(&[0.0, 1.0], &m, &mut out);
    assert_eq!(out, [3.0, 4.0]);
  }

  #[test]
  fn test_dimension_mismatch_is_rejected() {
    let mut t = RoutingTable::default();
    t.delays.pop();
    match t.validate(MAX_DELAY_SAMPLES) {
      Err(FdnError::Dimension { what, expected, actual }) => {
        assert_eq!(what, "delays");
        assert_eq!(expected, N);
        assert_eq!(actual, N - 1);
      }
      other => panic!("expected dimension error, got {other:?}"),
    }
  }

  #[test]
  fn test_oversized_delay_is_rejected() {
    let mut t = RoutingTable::default();
    t.delays[3] = 100_000.0;
    assert!(matches!(t.validate(MAX_DELAY_SAMPLES), Err(FdnError::InvalidDelay { index: 3, .. })));
  }

  #[test]
  fn test_bad_transpose_is_rejected() {
    let mut t = RoutingTable::default();
    t.feedback_transposed[1] += 0.5;
    assert!(matches!(t.validate(MAX_DELAY_SAMPLES), Err(FdnError::NotTransposed)));
  }

  #[test]
  fn test_json_derives_missing_transpose() {
    let t = RoutingTable::default();
    let mut value: serde_json::Value = serde_json::from_str(&t.to_json().unwrap()).unwrap();
    value.as_object_mut().unwrap().remove("feedback_transposed");
    let loaded = RoutingTable::from_json(&value.to_string()).unwrap();
    assert_eq!(loaded.feedback_transposed, t.feedback_transposed);
  }
}
