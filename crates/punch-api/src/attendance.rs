//! Handlers for `/attendance` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/attendance` | Optional `?date=YYYY-MM-DD`, defaults to today |
//! | `DELETE` | `/attendance/{date}` | Purges that day's records and scan log |

use axum::{Json, extract::State};
use chrono::{Local, NaiveDate};
use punch_core::{
  attendance::RosterRow,
  store::{AttendanceStore, PurgeCounts},
};
use serde::Deserialize;

use crate::{
  ApiState,
  error::ApiError,
  extract::{PathParam, QueryParams},
};

#[derive(Debug, Deserialize)]
pub struct RosterParams {
  pub date: Option<NaiveDate>,
}

/// `GET /attendance[?date=<date>]`
pub async fn roster<S>(
  State(state): State<ApiState<S>>,
  QueryParams(params): QueryParams<RosterParams>,
) -> Result<Json<Vec<RosterRow>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let date = params.date.unwrap_or_else(|| Local::now().date_naive());
  let rows = state.store.roster(date).await.map_err(ApiError::store)?;
  Ok(Json(rows))
}

/// `DELETE /attendance/{date}`
pub async fn purge<S>(
  State(state): State<ApiState<S>>,
  PathParam(date): PathParam<NaiveDate>,
) -> Result<Json<PurgeCounts>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let counts = state.store.purge_day(date).await.map_err(ApiError::store)?;
  Ok(Json(counts))
}
