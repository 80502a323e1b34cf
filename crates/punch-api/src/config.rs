//! Handlers for `/config`: read and reload the attendance policy.
//!
//! A `PUT` is validated, persisted, and only then swapped in. Writers hold
//! the policy gate across both steps, so the stored and the active policy
//! never disagree.

use axum::{Json, extract::State};
use punch_core::{policy::PolicySnapshot, store::AttendanceStore};

use crate::{ApiState, error::ApiError, extract::JsonBody};

/// `GET /config`
pub async fn get_current<S>(State(state): State<ApiState<S>>) -> Json<PolicySnapshot>
where
  S: AttendanceStore + 'static,
{
  Json(state.policy.current().as_ref().clone())
}

/// `PUT /config` with a [`PolicySnapshot`]. Missing fields take their
/// defaults.
pub async fn replace<S>(
  State(state): State<ApiState<S>>,
  JsonBody(next): JsonBody<PolicySnapshot>,
) -> Result<Json<PolicySnapshot>, ApiError>
where
  S: AttendanceStore + 'static,
{
  next.validate()?;
  let _gate = state.policy_gate.lock().await;
  state.store.save_policy(&next).await.map_err(ApiError::store)?;
  let active = state.policy.replace(next)?;
  Ok(Json(active.as_ref().clone()))
}
