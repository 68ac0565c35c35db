//! A consistent, read-only copy of the whole graph.
//!
//! Read-side consumers (the nudge rules) evaluate against a snapshot taken
//! in a single read transaction, so every rule sees the same state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  entity::{Entity, EntityId, EntityType},
  relation::Relation,
};

#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
  pub taken_at:  DateTime<Utc>,
  pub entities:  Vec<Entity>,
  pub relations: Vec<Relation>,
  #[serde(skip)]
  by_id:         HashMap<EntityId, usize>,
}

impl GraphSnapshot {
  pub fn new(taken_at: DateTime<Utc>, entities: Vec<Entity>, relations: Vec<Relation>) -> Self {
    let by_id = entities
      .iter()
      .enumerate()
      .map(|(i, e)| (e.id, i))
      .collect();
    Self { taken_at, entities, relations, by_id }
  }

  pub fn entity(&self, id: EntityId) -> Option<&Entity> {
    self.by_id.get(&id).map(|&i| &self.entities[i])
  }

  pub fn of_type(&self, entity_type: EntityType) -> impl Iterator<Item = &Entity> {
    self
      .entities
      .iter()
      .filter(move |e| e.entity_type == entity_type)
  }

  /// Relations with `id` at either end.
  pub fn incident(&self, id: EntityId) -> impl Iterator<Item = &Relation> {
    self.relations.iter().filter(move |r| r.touches(id))
  }

  /// Strongest relation touching `id`, or `None` for an isolated entity.
  pub fn max_strength(&self, id: EntityId) -> Option<f64> {
    self
      .incident(id)
      .map(|r| r.strength)
      .max_by(f64::total_cmp)
  }

  pub fn degree(&self, id: EntityId) -> usize { self.incident(id).count() }
}
