//! `GET /logs[?tag=&limit=&offset=]`: the scan log, newest first.

use axum::{Json, extract::State};
use punch_core::{
  scan::{LoggedScan, ScanQuery},
  store::AttendanceStore,
};

use crate::{ApiState, error::ApiError, extract::QueryParams};

const MAX_LIMIT: usize = 1000;

pub async fn list<S>(
  State(state): State<ApiState<S>>,
  QueryParams(mut query): QueryParams<ScanQuery>,
) -> Result<Json<Vec<LoggedScan>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  query.limit = Some(query.limit.unwrap_or(100).min(MAX_LIMIT));
  let scans = state.store.recent_scans(&query).await.map_err(ApiError::store)?;
  Ok(Json(scans))
}
