//! Running one command against the store and wrapping the outcome.

use std::{path::PathBuf, sync::Arc, time::Instant};

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use kg_core::{
  Classify,
  ErrorKind,
  entity::{EntityRef, NewEntity},
  store::{EntityQuery, GraphStore},
};
use kg_nudge::{NudgeConfig, NudgeEngine};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::Instrument as _;
use uuid::Uuid;

use crate::{
  command::{ChangelogArgs, Command, NeighborsArgs, QueryArgs, RelationArgs, StaleArgs},
  error::{ApiError, status_for},
};

// ─── Envelope ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
  pub kind:    ErrorKind,
  pub message: String,
}

/// The structured result of every command, success or not.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
  pub success: bool,
  pub command: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result:  Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:   Option<ErrorBody>,
}

impl Envelope {
  pub fn ok(command: impl Into<String>, result: Value) -> Self {
    Self { success: true, command: command.into(), result: Some(result), error: None }
  }

  pub fn failed(command: impl Into<String>, err: &ApiError) -> Self {
    Self {
      success: false,
      command: command.into(),
      result:  None,
      error:   Some(ErrorBody { kind: err.kind(), message: err.to_string() }),
    }
  }

  pub fn status(&self) -> StatusCode {
    match &self.error {
      None => StatusCode::OK,
      Some(e) => status_for(e.kind),
    }
  }
}

impl IntoResponse for Envelope {
  fn into_response(self) -> Response { (self.status(), Json(self)).into_response() }
}

// ─── Application state ───────────────────────────────────────────────────────

/// What every command needs: the store and where the nudge rules live.
pub struct AppState<S> {
  pub store:      Arc<S>,
  pub rules_path: Arc<PathBuf>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), rules_path: self.rules_path.clone() }
  }
}

impl<S: GraphStore> AppState<S> {
  pub fn new(store: Arc<S>, rules_path: impl Into<PathBuf>) -> Self {
    Self { store, rules_path: Arc::new(rules_path.into()) }
  }

  /// Run `command` with `args`. Never fails: errors come back inside the
  /// envelope.
  pub async fn dispatch(&self, command: &str, args: Value) -> Envelope {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
      "command",
      command,
      %request_id,
      duration_ms = tracing::field::Empty,
    );

    async move {
      let started = Instant::now();
      let outcome = match command.parse::<Command>() {
        Ok(cmd) => self.run(cmd, args).await,
        Err(_) => Err(ApiError::UnknownCommand(command.to_owned())),
      };
      let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
      tracing::Span::current().record("duration_ms", duration_ms);

      match outcome {
        Ok(result) => {
          tracing::info!("command succeeded");
          Envelope::ok(command, result)
        }
        Err(err) => {
          let kind = err.kind();
          if kind.is_retryable() || kind == ErrorKind::Config {
            tracing::error!(%kind, error = %err, "command failed");
          } else {
            tracing::warn!(%kind, error = %err, "command rejected");
          }
          Envelope::failed(command, &err)
        }
      }
    }
    .instrument(span)
    .await
  }

  async fn run(&self, cmd: Command, args: Value) -> Result<Value, ApiError> {
    let store = &*self.store;

    if cmd.needs_rules() {
      let config = NudgeConfig::load(&*self.rules_path)?;
      let engine = NudgeEngine::new(store, &config);
      return match (cmd, cmd.rule()) {
        (_, Some(kind)) => encode(engine.check(kind).await.map_err(ApiError::store)?),
        (Command::CheckAll, _) => encode(engine.check_all().await.map_err(ApiError::store)?),
        (Command::MorningBriefing, _) => {
          encode(engine.morning_briefing().await.map_err(ApiError::store)?)
        }
        _ => encode(engine.relationship_review().await.map_err(ApiError::store)?),
      };
    }

    match cmd {
      Command::Init => {
        store.init().await.map_err(ApiError::store)?;
        Ok(json!({ "initialized": true }))
      }
      Command::UpsertEntity => {
        let input: NewEntity = parse(cmd, args)?;
        encode(store.upsert_entity(input).await.map_err(ApiError::store)?)
      }
      Command::UpsertRelation => {
        let input = parse::<RelationArgs>(cmd, args)?.into_new_relation()?;
        encode(store.upsert_relation(input).await.map_err(ApiError::store)?)
      }
      Command::Query => {
        let query: EntityQuery = parse::<QueryArgs>(cmd, args)?.into();
        encode(store.query(&query).await.map_err(ApiError::store)?)
      }
      Command::Get => {
        let reference = EntityRef::from_json(&args)?;
        let detail = store.get_entity(reference).await.map_err(ApiError::store)?;
        Ok(json!({ "entity": encode(detail)? }))
      }
      Command::Stats => encode(store.stats().await.map_err(ApiError::store)?),
      Command::Stale => {
        let StaleArgs { days, entity_type } = parse(cmd, args)?;
        let stale = store.stale(days, entity_type).await.map_err(ApiError::store)?;
        Ok(json!({ "entities": encode(&stale)?, "count": stale.len(), "days": days }))
      }
      Command::Neighbors => {
        let reference = EntityRef::from_json(&args)?;
        let NeighborsArgs { hops, filter_type } = parse(cmd, args)?;
        encode(
          store
            .neighbors(reference, hops, filter_type)
            .await
            .map_err(ApiError::store)?,
        )
      }
      Command::DeleteEntity => {
        let reference = EntityRef::from_json(&args)?;
        encode(store.delete_entity(reference).await.map_err(ApiError::store)?)
      }
      Command::Changelog => {
        let ChangelogArgs { limit } = parse(cmd, args)?;
        let entries = store.changelog(limit).await.map_err(ApiError::store)?;
        Ok(json!({ "entries": encode(&entries)?, "count": entries.len() }))
      }
      other => Err(ApiError::UnknownCommand(other.to_string())),
    }
  }
}

/// Decode an argument payload; a missing payload reads as `{}`.
fn parse<T: DeserializeOwned>(cmd: Command, args: Value) -> Result<T, ApiError> {
  let args = if args.is_null() { json!({}) } else { args };
  serde_json::from_value(args).map_err(|source| ApiError::BadArgs { command: cmd.as_str(), source })
}

fn encode<T: Serialize>(value: T) -> Result<Value, ApiError> {
  serde_json::to_value(value).map_err(ApiError::Encode)
}
