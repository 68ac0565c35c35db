//! The append-only audit trail of mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{entity::EntityId, relation::RelationId};

/// Entries older than this are purged whenever a new entry is written.
pub const RETENTION_DAYS: i64 = 90;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeAction {
  EntityCreated,
  EntityUpdated,
  RelationUpsert,
  EntityDeleted,
}

impl ChangeAction {
  pub fn as_str(self) -> &'static str { self.into() }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
  pub id:          i64,
  pub ts:          DateTime<Utc>,
  pub action:      ChangeAction,
  pub entity_id:   Option<EntityId>,
  pub relation_id: Option<RelationId>,
  pub detail:      String,
}
