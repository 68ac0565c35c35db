//! Core types and trait definitions for the knowledge-graph store.
//!
//! This crate is deliberately free of database and HTTP dependencies. The
//! SQLite backend, the nudge engine and the command surface all depend on
//! it; it depends on nothing but serialisation and time handling.

pub mod changelog;
pub mod clock;
pub mod entity;
pub mod error;
pub mod metadata;
pub mod relation;
pub mod snapshot;
pub mod store;

pub use error::{Classify, Error, ErrorKind, Result};
