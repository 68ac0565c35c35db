//! The nudge engine: rule-based, prioritised notices over the knowledge
//! graph.
//!
//! Rules are pure functions over a [`GraphSnapshot`](kg_core::snapshot::GraphSnapshot)
//! and a validated [`NudgeConfig`]; [`NudgeEngine`] takes the snapshot from
//! any [`GraphStore`](kg_core::store::GraphStore), runs the rules and applies
//! the ranking, daily cap and quiet-hours policy.

pub mod config;
pub mod engine;
pub mod error;
pub mod nudge;
pub mod rank;
pub mod rules;

pub use config::{NudgeConfig, QuietHours};
pub use engine::{MorningBriefing, NudgeEngine, NudgeReport, RelationshipReview, RuleReport};
pub use error::{Error, Result};
pub use nudge::{Nudge, NudgeKind, Urgency};
