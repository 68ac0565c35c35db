//! Error types for `kg-core`, and the taxonomy shared by every crate.

use serde::Serialize;
use thiserror::Error;

use crate::entity::EntityType;

/// The failure categories a caller can branch on.
///
/// Every crate error maps onto exactly one kind through [`Classify`]; the
/// command boundary reports the kind alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  /// Malformed or out-of-range input.
  Validation,
  /// A referenced entity or relation does not exist.
  NotFound,
  /// A bare name resolves to entities of more than one type.
  AmbiguousReference,
  /// The nudge rules configuration is missing or invalid.
  Config,
  /// Underlying persistence failure (disk, lock timeout).
  Storage,
}

impl ErrorKind {
  /// Whether the operation may succeed if simply retried.
  pub fn is_retryable(self) -> bool { matches!(self, Self::Storage) }
}

/// Implemented by every error type that can cross the command boundary.
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation error: {0}")]
  Validation(String),

  #[error("unknown entity type: {0:?}")]
  UnknownEntityType(String),

  #[error("{what} not found: {reference}")]
  NotFound { what: &'static str, reference: String },

  #[error("ambiguous reference {name:?}: matches entities of types {types:?}")]
  Ambiguous { name: String, types: Vec<EntityType> },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }

  pub fn entity_not_found(reference: impl std::fmt::Display) -> Self {
    Self::NotFound { what: "entity", reference: reference.to_string() }
  }

  pub fn relation_not_found(reference: impl std::fmt::Display) -> Self {
    Self::NotFound { what: "relation", reference: reference.to_string() }
  }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Validation(_) | Error::UnknownEntityType(_) | Error::Serialization(_) => {
        ErrorKind::Validation
      }
      Error::NotFound { .. } => ErrorKind::NotFound,
      Error::Ambiguous { .. } => ErrorKind::AmbiguousReference,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
