//! The command boundary for the knowledge graph.
//!
//! A command is a name plus a JSON argument payload; the answer is always an
//! [`Envelope`] with a success flag and either the result or a classified
//! error. [`AppState::dispatch`] is the whole contract: the CLI calls it
//! directly and [`api_router`] exposes it over HTTP.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", kg_api::api_router(state.clone()))
//! ```

pub mod command;
pub mod dispatch;
pub mod error;
pub mod router;

pub use command::Command;
pub use dispatch::{AppState, Envelope, ErrorBody};
pub use error::ApiError;
pub use router::api_router;

#[cfg(test)]
mod tests;
