//! SQLite backend for the knowledge-graph store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Each store is one database
//! file, independent of any other application database.

mod encode;
mod ops;
mod schema;
mod store;
mod traverse;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
