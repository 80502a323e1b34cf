//! `POST /scans`: inject a scan as if the reader had produced it.
//!
//! The scan goes through the same intake queue as reader scans, so it is
//! ordered with them, and the handler waits for its decision.

use axum::{Json, extract::State};
use chrono::NaiveDateTime;
use punch_core::{
  engine::Decision,
  scan::Scan,
  store::AttendanceStore,
};
use serde::Deserialize;

use crate::{ApiState, error::ApiError, extract::JsonBody};

#[derive(Debug, Deserialize)]
pub struct ScanBody {
  pub tag:         String,
  /// Local time of the read; defaults to now.
  pub observed_at: Option<NaiveDateTime>,
  pub reader_id:   Option<String>,
}

pub async fn submit<S>(
  State(state): State<ApiState<S>>,
  JsonBody(body): JsonBody<ScanBody>,
) -> Result<Json<Decision>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let mut scan = match body.observed_at {
    Some(at) => Scan::new(body.tag, at),
    None => Scan::now(body.tag),
  };
  scan.reader_id = body.reader_id;

  let decision = state.queue.submit_and_wait(scan).await?;
  Ok(Json(decision))
}
