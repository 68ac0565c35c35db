//! The `GraphStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `kg-store-sqlite`).
//! Higher layers (`kg-nudge`, `kg-api`) depend on this abstraction, not on
//! any concrete backend.

use std::{
  collections::{BTreeMap, HashMap},
  future::Future,
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  Classify,
  changelog::ChangelogEntry,
  entity::{DeletedEntity, Entity, EntityDetail, EntityId, EntityRef, EntityType, EntityUpsert, NewEntity},
  metadata::Metadata,
  relation::{NewRelation, Relation, RelationId, RelationUpsert},
  snapshot::GraphSnapshot,
};

/// Page size used when a query does not name one.
pub const DEFAULT_QUERY_LIMIT: usize = 50;
/// Largest page a single query may return.
pub const MAX_QUERY_LIMIT: usize = 1000;
/// Deepest neighbour expansion accepted.
pub const MAX_HOPS: u32 = 5;
/// Largest staleness window accepted, roughly a century.
pub const MAX_STALE_DAYS: u32 = 36_500;
/// Length of the `most_connected` and `most_stale` lists in [`GraphStats`].
pub const STATS_TOP_N: usize = 10;

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`GraphStore::query`]. All supplied filters are ANDed.
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
  pub entity_type: Option<EntityType>,
  /// Free text matched word-by-word against the name + notes index.
  pub text:        Option<String>,
  /// Exact-match filter on dotted metadata paths. Keys outside the filter
  /// alphabet are ignored.
  pub metadata:    Metadata,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

impl EntityQuery {
  pub fn effective_limit(&self) -> usize {
    self
      .limit
      .unwrap_or(DEFAULT_QUERY_LIMIT)
      .min(MAX_QUERY_LIMIT)
  }
}

/// One page of query results plus the unpaged match count.
#[derive(Debug, Clone, Serialize)]
pub struct QueryPage {
  pub entities: Vec<Entity>,
  pub total:    usize,
}

/// An entity past its staleness horizon.
#[derive(Debug, Clone, Serialize)]
pub struct StaleEntity {
  #[serde(flatten)]
  pub entity:     Entity,
  pub rel_count:  usize,
  pub days_stale: i64,
}

/// An entity reached by neighbour expansion.
#[derive(Debug, Clone, Serialize)]
pub struct Neighbor {
  #[serde(flatten)]
  pub entity: Entity,
  /// Edges between the origin and this entity on the discovery path.
  pub hops:   u32,
  /// Relation types along the discovery path, origin first.
  pub via:    Vec<String>,
  /// Entity ids along the discovery path, origin first, this entity last.
  pub path:   Vec<EntityId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Neighborhood {
  pub origin:    Entity,
  pub neighbors: Vec<Neighbor>,
  /// Every edge crossed during the expansion.
  pub relations: Vec<Relation>,
}

/// Compact entity view used in statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
  pub id:             EntityId,
  pub name:           String,
  #[serde(rename = "type")]
  pub entity_type:    EntityType,
  pub rel_count:      usize,
  pub last_mentioned: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
  pub total_entities:  usize,
  pub total_relations: usize,
  pub by_type:         BTreeMap<EntityType, usize>,
  pub most_connected:  Vec<EntitySummary>,
  pub most_stale:      Vec<EntitySummary>,
}

impl GraphStats {
  /// Summarise a snapshot with the same orderings a backend's `stats` uses:
  /// degree descending, then staleness ascending, ties broken by id.
  pub fn from_snapshot(snapshot: &GraphSnapshot) -> Self {
    let mut by_type = BTreeMap::new();
    for e in &snapshot.entities {
      *by_type.entry(e.entity_type).or_insert(0) += 1;
    }

    let mut degree: HashMap<EntityId, usize> = HashMap::new();
    for r in &snapshot.relations {
      *degree.entry(r.source_id).or_insert(0) += 1;
      *degree.entry(r.target_id).or_insert(0) += 1;
    }

    let summaries: Vec<EntitySummary> = snapshot
      .entities
      .iter()
      .map(|e| EntitySummary {
        id:             e.id,
        name:           e.name.clone(),
        entity_type:    e.entity_type,
        rel_count:      degree.get(&e.id).copied().unwrap_or(0),
        last_mentioned: e.last_mentioned,
      })
      .collect();

    let mut most_connected = summaries.clone();
    most_connected.sort_by(|a, b| b.rel_count.cmp(&a.rel_count).then(a.id.cmp(&b.id)));
    most_connected.truncate(STATS_TOP_N);

    let mut most_stale = summaries;
    most_stale.sort_by_key(|s| (s.last_mentioned, s.id));
    most_stale.truncate(STATS_TOP_N);

    Self {
      total_entities: snapshot.entities.len(),
      total_relations: snapshot.relations.len(),
      by_type,
      most_connected,
      most_stale,
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a knowledge-graph backend.
///
/// Every mutation is a single all-or-nothing unit: the row, its search index
/// entry and its changelog entry commit together or not at all.
pub trait GraphStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  /// Create the schema. Idempotent.
  fn init(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Entities ──────────────────────────────────────────────────────────

  /// Create the entity, or merge into the existing `(name, type)` row and
  /// bump its mention count.
  fn upsert_entity(
    &self,
    input: NewEntity,
  ) -> impl Future<Output = Result<EntityUpsert, Self::Error>> + Send + '_;

  /// An entity with every incident relation, other endpoint resolved.
  fn get_entity(
    &self,
    reference: EntityRef,
  ) -> impl Future<Output = Result<EntityDetail, Self::Error>> + Send + '_;

  /// Delete an entity; its relations go with it.
  fn delete_entity(
    &self,
    reference: EntityRef,
  ) -> impl Future<Output = Result<DeletedEntity, Self::Error>> + Send + '_;

  // ── Relations ─────────────────────────────────────────────────────────

  /// Create or update the `(source, target, type)` relation.
  fn upsert_relation(
    &self,
    input: NewRelation,
  ) -> impl Future<Output = Result<RelationUpsert, Self::Error>> + Send + '_;

  /// Retrieve a relation by id. A missing (or cascaded) relation is a
  /// not-found error.
  fn get_relation(
    &self,
    id: RelationId,
  ) -> impl Future<Output = Result<Relation, Self::Error>> + Send + '_;

  // ── Queries ───────────────────────────────────────────────────────────

  /// Filtered search, most recently mentioned first, ties by id ascending.
  fn query<'a>(
    &'a self,
    query: &'a EntityQuery,
  ) -> impl Future<Output = Result<QueryPage, Self::Error>> + Send + 'a;

  /// Entities not mentioned within `days`, oldest first.
  fn stale(
    &self,
    days: u32,
    entity_type: Option<EntityType>,
  ) -> impl Future<Output = Result<Vec<StaleEntity>, Self::Error>> + Send + '_;

  /// Breadth-first expansion up to `hops` edges from `reference`.
  ///
  /// Edges are followed source → target; bidirectional edges are followed
  /// both ways. `filter_type` restricts the returned entities, not the walk.
  fn neighbors(
    &self,
    reference: EntityRef,
    hops: u32,
    filter_type: Option<EntityType>,
  ) -> impl Future<Output = Result<Neighborhood, Self::Error>> + Send + '_;

  fn stats(&self) -> impl Future<Output = Result<GraphStats, Self::Error>> + Send + '_;

  /// The most recent audit entries, newest first.
  fn changelog(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ChangelogEntry>, Self::Error>> + Send + '_;

  /// Every entity and relation, read in one transaction.
  fn snapshot(&self) -> impl Future<Output = Result<GraphSnapshot, Self::Error>> + Send + '_;

  /// The store's notion of the current time.
  fn now(&self) -> DateTime<Utc>;
}
