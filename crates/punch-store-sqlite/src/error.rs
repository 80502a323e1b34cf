//! Error type for `punch-store-sqlite`.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] punch_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The ledger refused to overwrite an existing check-in.
  #[error("subject {subject_id} already checked in on {date}")]
  CheckinAlreadyRecorded { subject_id: Uuid, date: NaiveDate },

  #[error("invalid directory seed: {0}")]
  InvalidSeed(String),

  #[error("invalid stored config value for {key:?}: {value:?}")]
  InvalidConfig { key: String, value: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
