//! Error type for `kg-store-sqlite`.

use kg_core::{Classify, ErrorKind};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] kg_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored row holds a value the domain types cannot represent.
  #[error("corrupt row: {0}")]
  Corrupt(String),

  /// Lock contention outlasted every retry.
  #[error("database busy during {op} after {attempts} attempts")]
  Busy { op: &'static str, attempts: u32 },
}

impl Error {
  /// Whether the failure is SQLite lock contention (`SQLITE_BUSY` or
  /// `SQLITE_LOCKED`), which is worth retrying.
  pub fn is_busy(&self) -> bool {
    let sqlite = match self {
      Error::Sqlite(e) => e,
      Error::Database(tokio_rusqlite::Error::Rusqlite(e)) => e,
      _ => return false,
    };
    matches!(
      sqlite,
      rusqlite::Error::SqliteFailure(f, _)
        if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
  }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Core(e) => e.kind(),
      _ => ErrorKind::Storage,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
