//! `GET /events`: server-sent events carrying attendance notifications.

use std::convert::Infallible;

use axum::{
  extract::State,
  response::sse::{Event, KeepAlive, Sse},
};
use punch_core::store::AttendanceStore;
use tokio_stream::{
  Stream, StreamExt as _,
  wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};

use crate::ApiState;

/// SSE event name for every notification.
pub const EVENT_NAME: &str = "attendance";

pub async fn stream<S>(
  State(state): State<ApiState<S>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
  S: AttendanceStore + 'static,
{
  let rx = state.events.subscribe();
  tracing::debug!(subscribers = state.events.subscriber_count(), "event subscriber connected");

  let events = BroadcastStream::new(rx).filter_map(|msg| match msg {
    Ok(n) => Event::default().event(EVENT_NAME).json_data(&n).ok().map(Ok),
    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
      tracing::warn!(skipped, "event subscriber lagged");
      None
    }
  });

  Sse::new(events).keep_alive(KeepAlive::default())
}
