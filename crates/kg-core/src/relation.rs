//! Relations: typed, weighted, directed edges between two entities.
//!
//! A relation is unique per `(source, target, type)`. The `bidirectional`
//! flag never creates a mirror row; it tells readers to treat the edge as
//! undirected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  entity::{EntityId, EntityRef, EntityType, UpsertAction, check_unit_interval},
  metadata::{self, Metadata},
};

pub type RelationId = i64;

/// Default strength for a relation created without one.
pub const DEFAULT_STRENGTH: f64 = 0.5;

/// Longest accepted relation type, in characters.
pub const MAX_TYPE_LEN: usize = 64;

/// A relation as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
  pub id:             RelationId,
  pub source_id:      EntityId,
  pub target_id:      EntityId,
  #[serde(rename = "type")]
  pub relation_type:  String,
  pub strength:       f64,
  pub bidirectional:  bool,
  pub metadata:       Metadata,
  pub last_confirmed: DateTime<Utc>,
}

impl Relation {
  pub fn touches(&self, id: EntityId) -> bool { self.source_id == id || self.target_id == id }

  /// The endpoint opposite `id`, if `id` is an endpoint at all.
  pub fn other_end(&self, id: EntityId) -> Option<EntityId> {
    if self.source_id == id {
      Some(self.target_id)
    } else if self.target_id == id {
      Some(self.source_id)
    } else {
      None
    }
  }
}

/// Input to [`GraphStore::upsert_relation`](crate::store::GraphStore::upsert_relation).
#[derive(Debug, Clone)]
pub struct NewRelation {
  pub source:        EntityRef,
  pub target:        EntityRef,
  pub relation_type: String,
  pub strength:      Option<f64>,
  pub bidirectional: Option<bool>,
  pub metadata:      Option<Metadata>,
}

impl NewRelation {
  pub fn new(source: EntityRef, target: EntityRef, relation_type: impl Into<String>) -> Self {
    Self {
      source,
      target,
      relation_type: relation_type.into(),
      strength: None,
      bidirectional: None,
      metadata: None,
    }
  }

  pub fn with_strength(mut self, strength: f64) -> Self {
    self.strength = Some(strength);
    self
  }

  pub fn bidirectional(mut self) -> Self {
    self.bidirectional = Some(true);
    self
  }

  pub fn with_metadata(mut self, metadata: Metadata) -> Self {
    self.metadata = Some(metadata);
    self
  }

  pub fn normalized(mut self) -> Result<Self> {
    let rtype = self.relation_type.trim();
    if rtype.is_empty() {
      return Err(Error::validation("relation type is required"));
    }
    if rtype.chars().count() > MAX_TYPE_LEN {
      return Err(Error::validation(format!(
        "relation type longer than {MAX_TYPE_LEN} characters"
      )));
    }
    self.relation_type = rtype.to_owned();
    if let Some(s) = self.strength {
      check_unit_interval("strength", s)?;
    }
    if let Some(m) = &self.metadata {
      metadata::validate(m)?;
    }
    Ok(self)
  }
}

/// The stored relation after an upsert, and whether it was new.
#[derive(Debug, Clone, Serialize)]
pub struct RelationUpsert {
  pub action:   UpsertAction,
  pub relation: Relation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Outgoing,
  Incoming,
}

/// A relation seen from one of its endpoints, with the other end resolved.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentRelation {
  #[serde(flatten)]
  pub relation:   Relation,
  pub direction:  Direction,
  pub other_id:   EntityId,
  pub other_name: String,
  pub other_type: EntityType,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalized_trims_type_and_checks_strength() {
    let rel = NewRelation::new(EntityRef::Id(1), EntityRef::Id(2), " knows ")
      .with_strength(0.6)
      .normalized()
      .unwrap();
    assert_eq!(rel.relation_type, "knows");

    let err = NewRelation::new(EntityRef::Id(1), EntityRef::Id(2), "knows")
      .with_strength(1.5)
      .normalized()
      .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    assert!(
      NewRelation::new(EntityRef::Id(1), EntityRef::Id(2), "  ")
        .normalized()
        .is_err()
    );
  }
}
