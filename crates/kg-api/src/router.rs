//! The HTTP surface: `POST /commands/{command}` with the arguments as the
//! JSON body.

use axum::{
  Router,
  body::Bytes,
  extract::{Path, State},
  routing::post,
};
use kg_core::store::GraphStore;
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::{
  dispatch::{AppState, Envelope},
  error::ApiError,
};

/// Build the command router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: GraphStore + 'static,
{
  Router::new()
    .route("/commands/{command}", post(command_handler::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn command_handler<S: GraphStore + 'static>(
  State(state): State<AppState<S>>,
  Path(command): Path<String>,
  body: Bytes,
) -> Envelope {
  let args = if body.iter().all(u8::is_ascii_whitespace) {
    Value::Null
  } else {
    match serde_json::from_slice(&body) {
      Ok(v) => v,
      Err(source) => {
        let err = ApiError::BadArgs { command: "request body", source };
        tracing::warn!(%command, error = %err, "unreadable request body");
        return Envelope::failed(command, &err);
      }
    }
  };
  state.dispatch(&command, args).await
}
