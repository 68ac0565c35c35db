//! Command-boundary error type.

use axum::http::StatusCode;
use kg_core::{Classify, ErrorKind};
use thiserror::Error;

/// Anything a single command can fail with. Every variant carries an
/// [`ErrorKind`] so callers can branch on it.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unknown command: {0:?}")]
  UnknownCommand(String),

  #[error("invalid arguments for {command}: {source}")]
  BadArgs {
    command: &'static str,
    #[source]
    source:  serde_json::Error,
  },

  #[error(transparent)]
  Core(#[from] kg_core::Error),

  #[error(transparent)]
  Rules(#[from] kg_nudge::Error),

  #[error("{source}")]
  Store {
    kind:   ErrorKind,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("cannot encode result: {0}")]
  Encode(#[source] serde_json::Error),
}

impl ApiError {
  /// Wrap a backend error, keeping its classification.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Classify + Send + Sync + 'static,
  {
    Self::Store { kind: err.kind(), source: Box::new(err) }
  }
}

impl Classify for ApiError {
  fn kind(&self) -> ErrorKind {
    match self {
      ApiError::UnknownCommand(_) | ApiError::BadArgs { .. } => ErrorKind::Validation,
      ApiError::Core(e) => e.kind(),
      ApiError::Rules(e) => e.kind(),
      ApiError::Store { kind, .. } => *kind,
      ApiError::Encode(_) => ErrorKind::Storage,
    }
  }
}

/// The HTTP status reported for a failure of `kind`.
pub fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::Validation => StatusCode::BAD_REQUEST,
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::AmbiguousReference => StatusCode::CONFLICT,
    ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
    ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
  }
}
