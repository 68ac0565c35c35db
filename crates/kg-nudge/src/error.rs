//! Error type for `kg-nudge`.
//!
//! The engine itself only surfaces store errors; everything raised here is
//! about the rules configuration.

use std::path::PathBuf;

use kg_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("cannot read nudge rules {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed nudge rules: {0}")]
  Parse(#[from] serde_json::Error),

  /// Every problem found in the document, in the order checked.
  #[error("invalid nudge rules: {}", .0.join("; "))]
  Invalid(Vec<String>),
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind { ErrorKind::Config }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
