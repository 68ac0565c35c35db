use std::{
  io,
  path::Path,
  sync::{Arc, Mutex},
};

use axum::{
  body::Body,
  http::{Request, StatusCode},
};
use chrono::{Duration, TimeZone as _, Utc};
use kg_core::{ErrorKind, clock::ManualClock};
use kg_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt as _;

use crate::{AppState, Envelope, api_router};

fn rules() -> Value {
  json!({
    "stale_thresholds_days": {"person": 14, "project": 10},
    "travel_alert_days": [7, 3, 1],
    "birthday_alert_days": 7,
    "quiet_hours": {"start": 23, "end": 8},
    "max_nudges_per_day": 5,
    "priority_weights": {
      "birthday": 10, "travel_prep": 9, "follow_up": 7,
      "stale_project": 6, "relationship_insight": 5, "opportunity": 4
    },
    "min_strength_for_followup": 0.5
  })
}

/// A state over a fresh in-memory store whose clock reads
/// 2026-03-01 12:00 UTC, with the rules file written into `dir`.
async fn state_in(dir: &Path, rules: &Value) -> (AppState<SqliteStore>, Arc<ManualClock>) {
  let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
  let store = SqliteStore::open_in_memory_with_clock(clock.clone()).await.unwrap();
  let rules_path = dir.join("nudge-rules.json");
  std::fs::write(&rules_path, rules.to_string()).unwrap();
  (AppState::new(Arc::new(store), rules_path), clock)
}

fn error_kind(envelope: &Envelope) -> ErrorKind {
  assert!(!envelope.success, "expected failure, got {envelope:?}");
  envelope.error.as_ref().unwrap().kind
}

fn result(envelope: Envelope) -> Value {
  assert!(envelope.success, "expected success, got {envelope:?}");
  envelope.result.unwrap()
}

// ── Dispatch ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_then_get_by_name() {
  let dir = TempDir::new().unwrap();
  let (state, _) = state_in(dir.path(), &rules()).await;

  let first = result(
    state
      .dispatch("upsert_entity", json!({"name": "John Smith", "type": "person", "confidence": 0.6}))
      .await,
  );
  assert_eq!(first["action"], "created");

  let second = result(
    state
      .dispatch("upsert_entity", json!({"name": "john smith", "type": "person", "confidence": 0.9}))
      .await,
  );
  assert_eq!(second["action"], "updated");

  let got = result(state.dispatch("get", json!({"name": "John Smith"})).await);
  assert_eq!(got["entity"]["confidence"], 0.9);
  assert_eq!(got["entity"]["mention_count"], 2);
  assert_eq!(got["entity"]["relationships"], json!([]));
}

#[tokio::test]
async fn relation_upsert_keeps_latest_strength() {
  let dir = TempDir::new().unwrap();
  let (state, _) = state_in(dir.path(), &rules()).await;
  for name in ["Adam", "John"] {
    result(state.dispatch("upsert_entity", json!({"name": name, "type": "person"})).await);
  }

  for strength in [0.6, 0.8] {
    result(
      state
        .dispatch(
          "upsert_relation",
          json!({"source": "Adam", "target": "John", "type": "knows", "strength": strength}),
        )
        .await,
    );
  }

  let stats = result(state.dispatch("stats", Value::Null).await);
  assert_eq!(stats["total_relations"], 1);
  let got = result(state.dispatch("get", json!({"name": "Adam"})).await);
  assert_eq!(got["entity"]["relationships"][0]["strength"], 0.8);
}

#[tokio::test]
async fn failures_are_classified() {
  let dir = TempDir::new().unwrap();
  let (state, _) = state_in(dir.path(), &rules()).await;
  result(state.dispatch("upsert_entity", json!({"name": "Mercury", "type": "project"})).await);
  result(state.dispatch("upsert_entity", json!({"name": "Mercury", "type": "place"})).await);

  let unknown = state.dispatch("drop_everything", json!({})).await;
  assert_eq!(unknown.command, "drop_everything");
  assert_eq!(error_kind(&unknown), ErrorKind::Validation);

  let missing_name = state.dispatch("upsert_entity", json!({"type": "person"})).await;
  assert_eq!(error_kind(&missing_name), ErrorKind::Validation);

  let bad_type = state.dispatch("query", json!({"type": "spaceship"})).await;
  assert_eq!(error_kind(&bad_type), ErrorKind::Validation);

  let absent = state.dispatch("get", json!({"name": "Nobody"})).await;
  assert_eq!(error_kind(&absent), ErrorKind::NotFound);

  let ambiguous = state.dispatch("delete_entity", json!({"name": "Mercury"})).await;
  assert_eq!(error_kind(&ambiguous), ErrorKind::AmbiguousReference);

  let typed = result(
    state
      .dispatch("delete_entity", json!({"name": "Mercury", "type": "place"}))
      .await,
  );
  assert_eq!(typed["relations_removed"], 0);
}

#[tokio::test]
async fn failure_envelope_has_no_result() {
  let dir = TempDir::new().unwrap();
  let (state, _) = state_in(dir.path(), &rules()).await;

  let envelope = state.dispatch("get", json!({"id": 42})).await;
  let v = serde_json::to_value(&envelope).unwrap();
  assert_eq!(v["success"], false);
  assert_eq!(v["command"], "get");
  assert_eq!(v["error"]["kind"], "not_found");
  assert!(v.get("result").is_none());
}

#[tokio::test]
async fn stale_neighbors_and_changelog() {
  let dir = TempDir::new().unwrap();
  let (state, clock) = state_in(dir.path(), &rules()).await;
  for name in ["Ada", "Bea"] {
    result(state.dispatch("upsert_entity", json!({"name": name, "type": "person"})).await);
  }
  result(
    state
      .dispatch("upsert_relation", json!({"source": "Ada", "target": "Bea", "type": "knows"}))
      .await,
  );
  clock.advance(Duration::days(20));

  let stale = result(state.dispatch("stale", json!({"type": "person"})).await);
  assert_eq!(stale["count"], 2);
  assert_eq!(stale["days"], 14);

  let hood = result(state.dispatch("neighbors", json!({"name": "Ada", "hops": 2})).await);
  assert_eq!(hood["neighbors"][0]["name"], "Bea");
  assert_eq!(hood["neighbors"][0]["hops"], 1);

  let zero = state.dispatch("neighbors", json!({"name": "Ada", "hops": 0})).await;
  assert_eq!(error_kind(&zero), ErrorKind::Validation);

  let log = result(state.dispatch("changelog", json!({"limit": 2})).await);
  assert_eq!(log["count"], 2);
  assert_eq!(log["entries"][0]["action"], "relation_upsert");
}

#[tokio::test]
async fn oversized_stale_window_leaves_store_usable() {
  let dir = TempDir::new().unwrap();
  let (state, _) = state_in(dir.path(), &rules()).await;
  result(state.dispatch("upsert_entity", json!({"name": "Ada", "type": "person"})).await);

  let huge = state.dispatch("stale", json!({"days": u32::MAX})).await;
  assert_eq!(error_kind(&huge), ErrorKind::Validation);

  let stats = result(state.dispatch("stats", json!({})).await);
  assert_eq!(stats["total_entities"], 1);
}

#[tokio::test]
async fn check_travel_reports_soon_trip() {
  let dir = TempDir::new().unwrap();
  let (state, _) = state_in(dir.path(), &rules()).await;
  result(
    state
      .dispatch(
        "upsert_entity",
        json!({"name": "Trip A", "type": "event", "metadata": {"start_date": "2026-03-04"}}),
      )
      .await,
  );

  let report = result(state.dispatch("check_travel", Value::Null).await);
  assert_eq!(report["count"], 1);
  assert_eq!(report["nudges"][0]["type"], "travel_prep");
  assert_eq!(report["nudges"][0]["urgency"], "soon");
}

#[tokio::test]
async fn check_all_is_silent_in_quiet_hours() {
  let dir = TempDir::new().unwrap();
  let (state, clock) = state_in(dir.path(), &rules()).await;
  result(state.dispatch("upsert_entity", json!({"name": "Launch", "type": "project"})).await);
  clock.set(Utc.with_ymd_and_hms(2026, 3, 31, 23, 30, 0).unwrap());

  let report = result(state.dispatch("check_all", json!({})).await);
  assert_eq!(report["quiet_hours"], true);
  assert_eq!(report["nudges"], json!([]));
  assert_eq!(report["total"], 1);

  let briefing = result(state.dispatch("morning_briefing", json!({})).await);
  assert_eq!(briefing["stats"]["total_entities"], 1);
}

#[tokio::test]
async fn bad_rules_fail_nudge_commands_only() {
  let dir = TempDir::new().unwrap();
  let mut broken = rules();
  broken.as_object_mut().unwrap().remove("quiet_hours");
  let (state, _) = state_in(dir.path(), &broken).await;

  let failed = state.dispatch("check_all", json!({})).await;
  assert_eq!(error_kind(&failed), ErrorKind::Config);
  let review = state.dispatch("relationship_review", json!({})).await;
  assert_eq!(error_kind(&review), ErrorKind::Config);

  result(state.dispatch("stats", json!({})).await);
}

/// Log sink shared between the subscriber and the test body.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

#[tokio::test]
async fn commands_log_their_duration() {
  let dir = TempDir::new().unwrap();
  let (state, _) = state_in(dir.path(), &rules()).await;

  let sink = Capture::default();
  let writer = sink.clone();
  let subscriber = tracing_subscriber::fmt()
    .with_ansi(false)
    .with_writer(move || writer.clone())
    .finish();
  let _guard = tracing::subscriber::set_default(subscriber);

  result(state.dispatch("stats", json!({})).await);
  error_kind(&state.dispatch("get", json!({"name": "Nobody"})).await);

  let logs = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
  let timed: Vec<_> = logs.lines().filter(|l| l.contains("duration_ms=")).collect();
  assert_eq!(timed.len(), 2, "{logs}");
  assert!(timed[0].contains("command=\"stats\"") && timed[0].contains("command succeeded"));
  assert!(timed[1].contains("command rejected") && timed[1].contains("kind=not_found"));
}

// ── HTTP ────────────────────────────────────────────────────────────────────

async fn post(state: AppState<SqliteStore>, command: &str, body: &str) -> (StatusCode, Value) {
  let req = Request::builder()
    .method("POST")
    .uri(format!("/commands/{command}"))
    .header("content-type", "application/json")
    .body(Body::from(body.to_string()))
    .unwrap();
  let resp = api_router(state).oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn http_status_follows_error_kind() {
  let dir = TempDir::new().unwrap();
  let (state, _) = state_in(dir.path(), &rules()).await;

  let (status, body) = post(
    state.clone(),
    "upsert_entity",
    r#"{"name": "Ada", "type": "person", "notes": "met at the conference"}"#,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["success"], true);
  assert_eq!(body["result"]["entity"]["name"], "Ada");

  let (status, body) = post(state.clone(), "stats", "").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["result"]["total_entities"], 1);

  let (status, body) = post(state.clone(), "get", r#"{"name": "Nobody"}"#).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["error"]["kind"], "not_found");

  let (status, _) = post(state.clone(), "upsert_entity", "{not json").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, body) = post(state, "frobnicate", "{}").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["command"], "frobnicate");
}

#[tokio::test]
async fn http_missing_rules_is_a_server_error() {
  let dir = TempDir::new().unwrap();
  let (state, _) = state_in(dir.path(), &rules()).await;
  let state = AppState::new(state.store.clone(), dir.path().join("absent.json"));

  let (status, body) = post(state, "check_birthdays", "{}").await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(body["error"]["kind"], "config");
}
