//! `GET /reader/status`: whether the tag reader is still feeding scans.

use axum::{Json, extract::State};
use punch_core::{reader::ReaderState, store::AttendanceStore};

use crate::ApiState;

pub async fn status<S>(State(state): State<ApiState<S>>) -> Json<ReaderState>
where
  S: AttendanceStore + 'static,
{
  Json(state.reader.current().as_ref().clone())
}
