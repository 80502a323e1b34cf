//! JSON REST API for the attendance engine.
//!
//! Exposes an axum [`Router`] backed by any [`AttendanceStore`]. Auth, TLS
//! and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", punch_api::api_router(state))
//! ```

pub mod attendance;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod logs;
pub mod reader;
pub mod scans;

use std::sync::Arc;

use axum::{
  Router,
  http::Uri,
  routing::{delete, get, post},
};
use punch_core::{
  intake::ScanQueue,
  notify::Broadcaster,
  policy::PolicyStore,
  reader::ReaderStatus,
  store::AttendanceStore,
};
use tokio::sync::Mutex;

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:   Arc<S>,
  pub policy:  Arc<PolicyStore>,
  /// Producer side of the decision loop's intake queue.
  pub queue:   ScanQueue,
  pub events:  Broadcaster,
  pub reader:  Arc<ReaderStatus>,
  /// Held across persisting and swapping a new policy.
  policy_gate: Arc<Mutex<()>>,
}

impl<S> ApiState<S> {
  pub fn new(store: Arc<S>, policy: Arc<PolicyStore>, queue: ScanQueue, events: Broadcaster) -> Self {
    Self {
      store,
      policy,
      queue,
      events,
      reader: Arc::default(),
      policy_gate: Arc::default(),
    }
  }

  pub fn with_reader(mut self, reader: Arc<ReaderStatus>) -> Self {
    self.reader = reader;
    self
  }
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:       Arc::clone(&self.store),
      policy:      Arc::clone(&self.policy),
      queue:       self.queue.clone(),
      events:      self.events.clone(),
      reader:      Arc::clone(&self.reader),
      policy_gate: Arc::clone(&self.policy_gate),
    }
  }
}

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: AttendanceStore + 'static,
{
  Router::new()
    // Attendance
    .route("/attendance", get(attendance::roster::<S>))
    .route("/attendance/{date}", delete(attendance::purge::<S>))
    // Scan log
    .route("/logs", get(logs::list::<S>))
    // Policy
    .route("/config", get(config::get_current::<S>).put(config::replace::<S>))
    // Intake
    .route("/scans", post(scans::submit::<S>))
    .route("/reader/status", get(reader::status::<S>))
    // Live notifications
    .route("/events", get(events::stream::<S>))
    .fallback(not_found)
    .with_state(state)
}

async fn not_found(uri: Uri) -> ApiError { ApiError::NotFound(format!("no route for {uri}")) }

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use chrono::{Local, NaiveDate};
  use punch_core::{
    engine::DecisionEngine,
    intake,
    notify::Action,
    policy::PolicySnapshot,
    subject::SubjectSeed,
  };
  use punch_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  async fn make_state() -> ApiState<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    store
      .seed_subject(SubjectSeed {
        code: "EMP001".into(),
        name: "Alice".into(),
        tags: vec!["ABCD0286".into()],
      })
      .await
      .unwrap();

    let policy = Arc::new(PolicyStore::default());
    let events = Broadcaster::new();
    let engine = DecisionEngine::new(Arc::clone(&store), Arc::clone(&policy), Arc::new(events.clone()));
    let (queue, rx) = intake::channel(16);
    tokio::spawn(async move { engine.run(rx).await });

    ApiState::new(store, policy, queue, events)
  }

  async fn call(state: ApiState<SqliteStore>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = api_router(state).oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
  }

  fn day() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 3, 4).unwrap() }

  // ── Scans ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn posted_scan_returns_decision() {
    let state = make_state().await;
    let (status, body) = call(
      state.clone(),
      "POST",
      "/scans",
      Some(json!({ "tag": "ABCD0286", "observed_at": "2024-03-04T08:50:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "checkin");
    assert_eq!(body["subject"]["name"], "Alice");

    let (_, body) = call(
      state,
      "POST",
      "/scans",
      Some(json!({ "tag": "ZZZZ", "observed_at": "2024-03-04T08:51:00" })),
    )
    .await;
    assert_eq!(body["outcome"], "unknown_tag");
    assert!(body["subject"].is_null());
  }

  #[tokio::test]
  async fn posted_scan_without_queue_is_unavailable() {
    let state = make_state().await;
    let (queue, rx) = intake::channel(1);
    drop(rx);
    let state = ApiState { queue, ..state };
    let (status, body) = call(state, "POST", "/scans", Some(json!({ "tag": "ABCD0286" }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
  }

  #[tokio::test]
  async fn accepted_scan_is_broadcast() {
    let state = make_state().await;
    let mut rx = state.events.subscribe();
    call(
      state,
      "POST",
      "/scans",
      Some(json!({ "tag": "ABCD0286", "observed_at": "2024-03-04T08:50:00" })),
    )
    .await;
    let n = rx.recv().await.unwrap();
    assert_eq!(n.action, Action::Checkin);
    assert_eq!(n.name, "Alice");
  }

  // ── Attendance ──────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn roster_reflects_decisions() {
    let state = make_state().await;
    call(
      state.clone(),
      "POST",
      "/scans",
      Some(json!({ "tag": "ABCD0286", "observed_at": "2024-03-04T08:50:00" })),
    )
    .await;

    let (status, body) = call(state.clone(), "GET", "/attendance?date=2024-03-04", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["status"], "present");
    assert_eq!(body[0]["check_in"], "2024-03-04T08:50:00");
    assert_eq!(body[0]["tags"], json!(["ABCD0286"]));

    let (_, body) = call(state, "GET", "/attendance?date=2024-03-05", None).await;
    assert_eq!(body[0]["status"], "absent");
  }

  #[tokio::test]
  async fn roster_defaults_to_today() {
    let state = make_state().await;
    let (status, body) = call(state, "GET", "/attendance", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["date"], Local::now().date_naive().to_string());
  }

  #[tokio::test]
  async fn purge_clears_the_day() {
    let state = make_state().await;
    call(
      state.clone(),
      "POST",
      "/scans",
      Some(json!({ "tag": "ABCD0286", "observed_at": "2024-03-04T08:50:00" })),
    )
    .await;

    let (status, body) = call(state.clone(), "DELETE", "/attendance/2024-03-04", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "attendance": 1, "scans": 1 }));

    let (_, body) = call(state.clone(), "GET", "/attendance?date=2024-03-04", None).await;
    assert_eq!(body[0]["status"], "absent");
    let (_, logs) = call(state, "GET", "/logs", None).await;
    assert_eq!(logs, json!([]));
  }

  #[tokio::test]
  async fn purge_with_bad_date_is_rejected() {
    let state = make_state().await;
    let (status, body) = call(state, "DELETE", "/attendance/yesterday", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
  }

  // ── Logs ────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn logs_list_newest_first_with_names() {
    let state = make_state().await;
    for (tag, t) in [("ABCD0286", "08:50:00"), ("ZZZZ", "08:51:00")] {
      call(
        state.clone(),
        "POST",
        "/scans",
        Some(json!({ "tag": tag, "observed_at": format!("{}T{t}", day()) })),
      )
      .await;
    }

    let (status, body) = call(state.clone(), "GET", "/logs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["tag"], "ZZZZ");
    assert!(body[0]["subject_name"].is_null());
    assert_eq!(body[1]["subject_name"], "Alice");
    assert_eq!(body[1]["outcome"], "checkin");
    assert_eq!(body[1]["note"], "Check-in recorded successfully");

    let (_, body) = call(state, "GET", "/logs?tag=ABCD0286&limit=5", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn logs_with_bad_limit_are_rejected() {
    let state = make_state().await;
    let (status, body) = call(state, "GET", "/logs?limit=-1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
  }

  // ── Config ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn config_reload_is_persisted_and_applied() {
    let state = make_state().await;
    let (_, current) = call(state.clone(), "GET", "/config", None).await;
    assert_eq!(current["checkin"]["start"], "08:45");

    let next = json!({
      "checkin": { "start": "07:00", "end": "08:00" },
      "checkout": { "start": "16:00", "end": "17:00" },
      "cooldown_secs": 3,
      "reader_id": "SIDE_DOOR",
    });
    let (status, body) = call(state.clone(), "PUT", "/config", Some(next)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reader_id"], "SIDE_DOOR");

    assert_eq!(state.policy.current().cooldown_secs, 3);
    let stored: PolicySnapshot = state.store.load_policy().await.unwrap().unwrap();
    assert_eq!(stored.reader_id, "SIDE_DOOR");

    let (_, body) = call(
      state,
      "POST",
      "/scans",
      Some(json!({ "tag": "ABCD0286", "observed_at": "2024-03-04T07:30:00" })),
    )
    .await;
    assert_eq!(body["outcome"], "checkin");
  }

  #[tokio::test]
  async fn invalid_config_is_rejected_and_not_applied() {
    let state = make_state().await;
    let bad = json!({
      "checkin": { "start": "09:00", "end": "08:00" },
      "checkout": { "start": "16:00", "end": "17:00" },
      "cooldown_secs": 3,
      "reader_id": "SIDE_DOOR",
    });
    let (status, body) = call(state.clone(), "PUT", "/config", Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("checkin"));
    assert_eq!(*state.policy.current(), PolicySnapshot::default());
    assert!(state.store.load_policy().await.unwrap().is_none());
  }

  #[tokio::test]
  async fn malformed_config_body_is_a_json_bad_request() {
    let state = make_state().await;
    let bad = json!({ "checkin": { "start": "quarter", "end": "09:00" } });
    let (status, body) = call(state.clone(), "PUT", "/config", Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(*state.policy.current(), PolicySnapshot::default());
  }

  #[tokio::test]
  async fn partial_config_keeps_defaults_for_missing_fields() {
    let state = make_state().await;
    let (status, body) =
      call(state, "PUT", "/config", Some(json!({ "cooldown_secs": 30 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cooldown_secs"], 30);
    assert_eq!(body["checkin"]["start"], "08:45");
  }

  #[tokio::test]
  async fn concurrent_config_writes_leave_store_and_active_policy_equal() {
    let state = make_state().await;
    let mut writers = Vec::new();
    for i in 0..8 {
      let state = state.clone();
      writers.push(tokio::spawn(async move {
        let next = json!({ "reader_id": format!("READER_{i}") });
        call(state, "PUT", "/config", Some(next)).await
      }));
    }
    for w in writers {
      assert_eq!(w.await.unwrap().0, StatusCode::OK);
    }
    let stored = state.store.load_policy().await.unwrap().unwrap();
    assert_eq!(stored, *state.policy.current());
  }

  // ── Reader & routing ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn reader_status_reports_shared_state() {
    let reader = Arc::new(ReaderStatus::default());
    let state = make_state().await.with_reader(Arc::clone(&reader));

    let (status, body) = call(state.clone(), "GET", "/reader/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert!(body["device"].is_null());

    reader.started("-");
    let (_, body) = call(state.clone(), "GET", "/reader/status", None).await;
    assert_eq!(body["running"], true);
    assert_eq!(body["device"], "-");

    reader.stopped(Some("end of input".into()));
    let (_, body) = call(state, "GET", "/reader/status", None).await;
    assert_eq!(body["running"], false);
    assert_eq!(body["last_error"], "end of input");
  }

  #[tokio::test]
  async fn unknown_route_is_a_json_not_found() {
    let state = make_state().await;
    let (status, body) = call(state, "GET", "/employees", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("/employees"));
  }

  // ── Events ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn event_stream_delivers_attendance_events() {
    use std::time::Duration;

    use punch_core::scan::Scan;
    use tokio_stream::StreamExt as _;

    let state = make_state().await;
    let resp = api_router(state.clone())
      .oneshot(Request::builder().uri("/events").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");

    let at = day().and_hms_opt(8, 50, 0).unwrap();
    state.queue.submit_and_wait(Scan::new("ABCD0286", at)).await.unwrap();

    let mut body = resp.into_body().into_data_stream();
    let mut text = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
      while !text.contains("\n\n") {
        let chunk = body.next().await.unwrap().unwrap();
        text.push_str(std::str::from_utf8(&chunk).unwrap());
      }
    })
    .await
    .unwrap();

    assert!(text.contains(&format!("event: {}", events::EVENT_NAME)));
    assert!(text.contains(r#""action":"checkin""#));
    assert!(text.contains(r#""name":"Alice""#));
  }
}
