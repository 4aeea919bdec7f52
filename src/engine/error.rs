use thiserror::Error;

#[derive(Debug, Error)]
pub enum FdnError {
  #[error("{what}: expected {expected} values, got {actual}")]
  Dimension { what: &'static str, expected: usize, actual: usize },
  #[error("delay line {index} has invalid length {value}")]
  InvalidDelay { index: usize, value: f32 },
  #[error("feedback_transposed is not the transpose of feedback")]
  NotTransposed,
  #[error("engine has {engine} channels but host offers {host}")]
  ChannelMismatch { engine: usize, host: usize },
  #[error("invalid sample rate {0}")]
  SampleRate(f32),
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error(transparent)]
  Io(#[from] std::io::Error),
  #[error(transparent)]
  Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, FdnError>;
