//! Error types for `punch-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid policy: {0}")]
  InvalidPolicy(String),

  #[error("unknown outcome tag: {0:?}")]
  UnknownOutcome(String),

  /// The store was unreachable or rejected a write. Nothing from the
  /// decision was committed.
  #[error("persistence error: {0}")]
  Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("scan intake queue is closed")]
  QueueClosed,
}

impl Error {
  pub fn persistence<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Persistence(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
