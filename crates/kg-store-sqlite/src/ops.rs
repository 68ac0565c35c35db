//! Synchronous operations run inside one SQLite transaction.
//!
//! Every function here takes the open transaction (as a `Connection`) and
//! the instant the command started, so a single command stamps all of its
//! rows with the same time. Callers own commit and rollback.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use kg_core::{
  changelog::{ChangeAction, ChangelogEntry, RETENTION_DAYS},
  entity::{
    DEFAULT_CONFIDENCE, DeletedEntity, Entity, EntityDetail, EntityId, EntityRef, EntityType,
    EntityUpsert, NewEntity, UpsertAction,
  },
  metadata,
  relation::{
    DEFAULT_STRENGTH, Direction, IncidentRelation, NewRelation, Relation, RelationId,
    RelationUpsert,
  },
  snapshot::GraphSnapshot,
  store::{EntityQuery, EntitySummary, GraphStats, QueryPage, STATS_TOP_N, StaleEntity},
};
use rusqlite::{Connection, OptionalExtension as _, params, params_from_iter, types::Value as SqlValue};
use serde_json::Value;

use crate::{
  Result,
  encode::{
    ENTITY_COLUMNS, RELATION_COLUMNS, RawChange, RawEntity, RawRelation, encode_dt,
    encode_metadata, name_key,
  },
};

/// Degree of the entity aliased `e`, as a correlated subquery.
const DEGREE_SQL: &str =
  "(SELECT COUNT(*) FROM relations x WHERE x.source_id = e.id OR x.target_id = e.id)";

// ─── Changelog ───────────────────────────────────────────────────────────────

/// Append an audit entry and purge entries past the retention window.
pub fn record_change(
  conn: &Connection,
  now: DateTime<Utc>,
  action: ChangeAction,
  entity_id: Option<EntityId>,
  relation_id: Option<RelationId>,
  detail: &str,
) -> Result<()> {
  conn.execute(
    "INSERT INTO changelog (ts, action, entity_id, relation_id, detail)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    params![encode_dt(now), action.as_str(), entity_id, relation_id, detail],
  )?;
  let cutoff = encode_dt(now - Duration::days(RETENTION_DAYS));
  conn.execute("DELETE FROM changelog WHERE ts < ?1", params![cutoff])?;
  Ok(())
}

pub fn recent_changes(conn: &Connection, limit: usize) -> Result<Vec<ChangelogEntry>> {
  let mut stmt = conn.prepare(
    "SELECT id, ts, action, entity_id, relation_id, detail
     FROM changelog ORDER BY id DESC LIMIT ?1",
  )?;
  let raws = stmt
    .query_map(params![limit as i64], RawChange::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawChange::into_entry).collect()
}

// ─── Entity reads ────────────────────────────────────────────────────────────

pub fn entity_by_id(conn: &Connection, id: EntityId) -> Result<Option<Entity>> {
  let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.id = ?1");
  conn
    .query_row(&sql, params![id], RawEntity::from_row)
    .optional()?
    .map(RawEntity::into_entity)
    .transpose()
}

fn entity_by_key(conn: &Connection, name: &str, entity_type: EntityType) -> Result<Option<Entity>> {
  let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.name_key = ?1 AND e.type = ?2");
  conn
    .query_row(&sql, params![name_key(name), entity_type.as_str()], RawEntity::from_row)
    .optional()?
    .map(RawEntity::into_entity)
    .transpose()
}

/// Resolve a reference to exactly one entity.
///
/// A bare name that matches entities of several types is ambiguous; the
/// caller must narrow it with a type or use the id.
pub fn resolve(conn: &Connection, reference: &EntityRef) -> Result<Entity> {
  let found = match reference {
    EntityRef::Id(id) => entity_by_id(conn, *id)?,
    EntityRef::Name { name, entity_type: Some(t) } => entity_by_key(conn, name, *t)?,
    EntityRef::Name { name, entity_type: None } => {
      let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.name_key = ?1 ORDER BY e.id");
      let mut stmt = conn.prepare(&sql)?;
      let mut matches = stmt
        .query_map(params![name_key(name)], RawEntity::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .map(RawEntity::into_entity)
        .collect::<Result<Vec<_>>>()?;
      if matches.len() > 1 {
        return Err(
          kg_core::Error::Ambiguous {
            name:  name.clone(),
            types: matches.iter().map(|e| e.entity_type).collect(),
          }
          .into(),
        );
      }
      matches.pop()
    }
  };
  found.ok_or_else(|| kg_core::Error::entity_not_found(reference).into())
}

fn query_entities(conn: &Connection, sql: &str, params: &[SqlValue]) -> Result<Vec<Entity>> {
  let mut stmt = conn.prepare(sql)?;
  let raws = stmt
    .query_map(params_from_iter(params.iter()), RawEntity::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawEntity::into_entity).collect()
}

pub fn relations_where(conn: &Connection, clause: &str, params: &[SqlValue]) -> Result<Vec<Relation>> {
  let sql = format!("SELECT {RELATION_COLUMNS} FROM relations r WHERE {clause} ORDER BY r.id");
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(params_from_iter(params.iter()), RawRelation::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawRelation::into_relation).collect()
}

/// Fetch entities by id, in ascending id order.
pub fn entities_by_ids(conn: &Connection, ids: &[EntityId]) -> Result<Vec<Entity>> {
  if ids.is_empty() {
    return Ok(Vec::new());
  }
  let sql = format!(
    "SELECT {ENTITY_COLUMNS} FROM entities e
     WHERE e.id IN (SELECT value FROM json_each(?1)) ORDER BY e.id"
  );
  query_entities(conn, &sql, &[id_array(ids)])
}

/// Bind a whole id set as one JSON array parameter, read back with
/// `json_each`. Keeps large sets clear of SQLite's host-parameter limit.
pub fn id_array(ids: &[EntityId]) -> SqlValue {
  let items: Vec<String> = ids.iter().map(i64::to_string).collect();
  SqlValue::Text(format!("[{}]", items.join(",")))
}

// ─── Entity writes ───────────────────────────────────────────────────────────

pub fn upsert_entity(conn: &Connection, now: DateTime<Utc>, input: &NewEntity) -> Result<EntityUpsert> {
  let detail = format!("{}: {}", input.entity_type, input.name);

  match entity_by_key(conn, &input.name, input.entity_type)? {
    None => {
      let metadata = input
        .metadata
        .as_ref()
        .map(metadata::without_nulls)
        .unwrap_or_default();
      let notes = input.notes.clone().unwrap_or_default();
      let confidence = input.confidence.unwrap_or(DEFAULT_CONFIDENCE);
      let now_str = encode_dt(now);

      conn.execute(
        "INSERT INTO entities (
           name, name_key, type, metadata, notes, confidence,
           mention_count, first_seen, last_seen, last_mentioned
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7, ?7)",
        params![
          input.name,
          name_key(&input.name),
          input.entity_type.as_str(),
          encode_metadata(&metadata)?,
          notes,
          confidence,
          now_str,
        ],
      )?;
      let id = conn.last_insert_rowid();
      record_change(conn, now, ChangeAction::EntityCreated, Some(id), None, &detail)?;
      tracing::debug!(id, %detail, "entity created");

      Ok(EntityUpsert {
        action: UpsertAction::Created,
        entity: Entity {
          id,
          name: input.name.clone(),
          entity_type: input.entity_type,
          metadata,
          notes,
          confidence,
          mention_count: 1,
          first_seen: now,
          last_seen: now,
          last_mentioned: now,
        },
      })
    }
    Some(mut entity) => {
      if let Some(patch) = &input.metadata {
        metadata::merge_patch(&mut entity.metadata, patch);
      }
      if let Some(notes) = &input.notes {
        entity.notes = notes.clone();
      }
      if let Some(confidence) = input.confidence {
        entity.confidence = confidence;
      }
      entity.mention_count += 1;
      entity.last_seen = now;
      entity.last_mentioned = now;

      let now_str = encode_dt(now);
      conn.execute(
        "UPDATE entities
         SET metadata = ?1, notes = ?2, confidence = ?3, mention_count = ?4,
             last_seen = ?5, last_mentioned = ?5
         WHERE id = ?6",
        params![
          encode_metadata(&entity.metadata)?,
          entity.notes,
          entity.confidence,
          entity.mention_count,
          now_str,
          entity.id,
        ],
      )?;
      record_change(conn, now, ChangeAction::EntityUpdated, Some(entity.id), None, &detail)?;
      tracing::debug!(id = entity.id, mentions = entity.mention_count, %detail, "entity updated");

      Ok(EntityUpsert { action: UpsertAction::Updated, entity })
    }
  }
}

pub fn delete_entity(conn: &Connection, now: DateTime<Utc>, reference: &EntityRef) -> Result<DeletedEntity> {
  let entity = resolve(conn, reference)?;
  let relations_removed: i64 = conn.query_row(
    "SELECT COUNT(*) FROM relations WHERE source_id = ?1 OR target_id = ?1",
    params![entity.id],
    |r| r.get(0),
  )?;

  // Relations go with the row through ON DELETE CASCADE.
  conn.execute("DELETE FROM entities WHERE id = ?1", params![entity.id])?;

  let detail = format!(
    "{}: {} ({relations_removed} relations removed)",
    entity.entity_type, entity.name
  );
  record_change(conn, now, ChangeAction::EntityDeleted, Some(entity.id), None, &detail)?;
  tracing::debug!(id = entity.id, %detail, "entity deleted");

  Ok(DeletedEntity { entity, relations_removed: relations_removed as usize })
}

pub fn entity_detail(conn: &Connection, reference: &EntityRef) -> Result<EntityDetail> {
  let entity = resolve(conn, reference)?;

  let sql = format!(
    "SELECT {RELATION_COLUMNS}, o.name, o.type
     FROM relations r
     JOIN entities o ON o.id = CASE WHEN r.source_id = ?1 THEN r.target_id ELSE r.source_id END
     WHERE r.source_id = ?1 OR r.target_id = ?1
     ORDER BY r.strength DESC, r.id ASC"
  );
  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt
    .query_map(params![entity.id], |row| {
      Ok((RawRelation::from_row(row)?, row.get::<_, String>(8)?, row.get::<_, String>(9)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let relationships = rows
    .into_iter()
    .map(|(raw, other_name, other_type)| {
      let relation = raw.into_relation()?;
      let (direction, other_id) = if relation.source_id == entity.id {
        (Direction::Outgoing, relation.target_id)
      } else {
        (Direction::Incoming, relation.source_id)
      };
      Ok(IncidentRelation {
        relation,
        direction,
        other_id,
        other_name,
        other_type: crate::encode::decode_entity_type(&other_type)?,
      })
    })
    .collect::<Result<Vec<_>>>()?;

  Ok(EntityDetail { entity, relationships })
}

// ─── Relations ───────────────────────────────────────────────────────────────

pub fn relation_by_id(conn: &Connection, id: RelationId) -> Result<Option<Relation>> {
  Ok(relations_where(conn, "r.id = ?", &[SqlValue::Integer(id)])?.pop())
}

pub fn upsert_relation(conn: &Connection, now: DateTime<Utc>, input: &NewRelation) -> Result<RelationUpsert> {
  let source = resolve(conn, &input.source)?;
  let target = resolve(conn, &input.target)?;
  if source.id == target.id {
    return Err(kg_core::Error::validation("a relation cannot connect an entity to itself").into());
  }

  let existing = relations_where(
    conn,
    "r.source_id = ? AND r.target_id = ? AND r.type = ?",
    &[
      SqlValue::Integer(source.id),
      SqlValue::Integer(target.id),
      SqlValue::Text(input.relation_type.clone()),
    ],
  )?
  .pop();

  let (action, relation) = match existing {
    None => {
      let metadata = input
        .metadata
        .as_ref()
        .map(metadata::without_nulls)
        .unwrap_or_default();
      let strength = input.strength.unwrap_or(DEFAULT_STRENGTH);
      let bidirectional = input.bidirectional.unwrap_or(false);
      conn.execute(
        "INSERT INTO relations (
           source_id, target_id, type, strength, bidirectional, metadata, last_confirmed
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
          source.id,
          target.id,
          input.relation_type,
          strength,
          bidirectional,
          encode_metadata(&metadata)?,
          encode_dt(now),
        ],
      )?;
      let relation = Relation {
        id: conn.last_insert_rowid(),
        source_id: source.id,
        target_id: target.id,
        relation_type: input.relation_type.clone(),
        strength,
        bidirectional,
        metadata,
        last_confirmed: now,
      };
      (UpsertAction::Created, relation)
    }
    Some(mut relation) => {
      if let Some(strength) = input.strength {
        relation.strength = strength;
      }
      if let Some(bidirectional) = input.bidirectional {
        relation.bidirectional = bidirectional;
      }
      if let Some(patch) = &input.metadata {
        metadata::merge_patch(&mut relation.metadata, patch);
      }
      relation.last_confirmed = now;
      conn.execute(
        "UPDATE relations
         SET strength = ?1, bidirectional = ?2, metadata = ?3, last_confirmed = ?4
         WHERE id = ?5",
        params![
          relation.strength,
          relation.bidirectional,
          encode_metadata(&relation.metadata)?,
          encode_dt(now),
          relation.id,
        ],
      )?;
      (UpsertAction::Updated, relation)
    }
  };

  let detail = format!("{} --[{}]--> {}", source.name, relation.relation_type, target.name);
  record_change(conn, now, ChangeAction::RelationUpsert, None, Some(relation.id), &detail)?;
  tracing::debug!(id = relation.id, ?action, %detail, "relation upserted");

  Ok(RelationUpsert { action, relation })
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Split free text into words and quote each one as an FTS5 term, so that
/// caller text can never be read as FTS query syntax.
pub fn fts_expression(text: &str) -> Option<String> {
  let terms: Vec<String> = text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|t| !t.is_empty())
    .map(|t| format!("\"{t}\""))
    .collect();
  (!terms.is_empty()).then(|| terms.join(" "))
}

/// Bind a JSON filter value the way `json_extract` reports it.
fn metadata_condition(key: &str, value: &Value) -> (String, Vec<SqlValue>) {
  let path = SqlValue::Text(format!("$.{key}"));
  match value {
    Value::Null => ("json_extract(e.metadata, ?) IS NULL".into(), vec![path]),
    Value::Bool(b) => ("json_extract(e.metadata, ?) = ?".into(), vec![path, SqlValue::Integer(i64::from(*b))]),
    Value::Number(n) => {
      let bound = match n.as_i64() {
        Some(i) => SqlValue::Integer(i),
        None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
      };
      ("json_extract(e.metadata, ?) = ?".into(), vec![path, bound])
    }
    Value::String(s) => ("json_extract(e.metadata, ?) = ?".into(), vec![path, SqlValue::Text(s.clone())]),
    Value::Array(_) | Value::Object(_) => (
      "json_extract(e.metadata, ?) = json(?)".into(),
      vec![path, SqlValue::Text(value.to_string())],
    ),
  }
}

pub fn query(conn: &Connection, q: &EntityQuery) -> Result<QueryPage> {
  let mut conds: Vec<String> = Vec::new();
  let mut params: Vec<SqlValue> = Vec::new();

  if let Some(t) = q.entity_type {
    conds.push("e.type = ?".into());
    params.push(SqlValue::Text(t.as_str().into()));
  }

  if let Some(text) = q.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
    let Some(expr) = fts_expression(text) else {
      return Ok(QueryPage { entities: Vec::new(), total: 0 });
    };
    conds.push("e.id IN (SELECT rowid FROM entities_fts WHERE entities_fts MATCH ?)".into());
    params.push(SqlValue::Text(expr));
  }

  for (key, value) in &q.metadata {
    if !metadata::is_filter_key(key) {
      tracing::debug!(key, "ignoring metadata filter key outside the allowed alphabet");
      continue;
    }
    let (cond, bound) = metadata_condition(key, value);
    conds.push(cond);
    params.extend(bound);
  }

  let where_clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };

  let total: i64 = conn.query_row(
    &format!("SELECT COUNT(*) FROM entities e {where_clause}"),
    params_from_iter(params.iter()),
    |r| r.get(0),
  )?;

  let sql = format!(
    "SELECT {ENTITY_COLUMNS} FROM entities e {where_clause}
     ORDER BY e.last_mentioned DESC, e.id ASC
     LIMIT ? OFFSET ?"
  );
  params.push(SqlValue::Integer(q.effective_limit() as i64));
  params.push(SqlValue::Integer(q.offset.unwrap_or(0) as i64));
  let entities = query_entities(conn, &sql, &params)?;

  Ok(QueryPage { entities, total: total as usize })
}

pub fn stale(
  conn: &Connection,
  now: DateTime<Utc>,
  days: u32,
  entity_type: Option<EntityType>,
) -> Result<Vec<StaleEntity>> {
  let cutoff = now
    .checked_sub_signed(Duration::days(i64::from(days)))
    .ok_or_else(|| {
      kg_core::Error::validation(format!("staleness window of {days} days is out of range"))
    })?;
  let cutoff = encode_dt(cutoff);
  let mut params = vec![SqlValue::Text(cutoff)];
  let type_cond = match entity_type {
    Some(t) => {
      params.push(SqlValue::Text(t.as_str().into()));
      "AND e.type = ?"
    }
    None => "",
  };

  let sql = format!(
    "SELECT {ENTITY_COLUMNS}, {DEGREE_SQL}
     FROM entities e
     WHERE e.last_mentioned < ? {type_cond}
     ORDER BY e.last_mentioned ASC, e.id ASC"
  );
  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt
    .query_map(params_from_iter(params.iter()), |row| {
      Ok((RawEntity::from_row(row)?, row.get::<_, i64>(10)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  rows
    .into_iter()
    .map(|(raw, rel_count)| {
      let entity = raw.into_entity()?;
      Ok(StaleEntity {
        days_stale: entity.days_since_mentioned(now),
        rel_count: rel_count as usize,
        entity,
      })
    })
    .collect()
}

// ─── Statistics & snapshot ───────────────────────────────────────────────────

fn summaries(conn: &Connection, order_by: &str) -> Result<Vec<EntitySummary>> {
  let sql = format!(
    "SELECT e.id, e.name, e.type, e.last_mentioned, {DEGREE_SQL} AS rel_count
     FROM entities e
     ORDER BY {order_by}
     LIMIT ?1"
  );
  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt
    .query_map(params![STATS_TOP_N as i64], |row| {
      Ok((
        row.get::<_, i64>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
        row.get::<_, i64>(4)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  rows
    .into_iter()
    .map(|(id, name, entity_type, last_mentioned, rel_count)| {
      Ok(EntitySummary {
        id,
        name,
        entity_type: crate::encode::decode_entity_type(&entity_type)?,
        rel_count: rel_count as usize,
        last_mentioned: crate::encode::decode_dt(&last_mentioned)?,
      })
    })
    .collect()
}

pub fn stats(conn: &Connection) -> Result<GraphStats> {
  let total_entities: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |r| r.get(0))?;
  let total_relations: i64 = conn.query_row("SELECT COUNT(*) FROM relations", [], |r| r.get(0))?;

  let mut stmt = conn.prepare("SELECT type, COUNT(*) FROM entities GROUP BY type")?;
  let counts = stmt
    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let by_type = counts
    .into_iter()
    .map(|(t, n)| Ok((crate::encode::decode_entity_type(&t)?, n as usize)))
    .collect::<Result<BTreeMap<_, _>>>()?;

  Ok(GraphStats {
    total_entities: total_entities as usize,
    total_relations: total_relations as usize,
    by_type,
    most_connected: summaries(conn, "rel_count DESC, e.id ASC")?,
    most_stale: summaries(conn, "e.last_mentioned ASC, e.id ASC")?,
  })
}

pub fn snapshot(conn: &Connection, now: DateTime<Utc>) -> Result<GraphSnapshot> {
  let entities = query_entities(
    conn,
    &format!("SELECT {ENTITY_COLUMNS} FROM entities e ORDER BY e.id"),
    &[],
  )?;
  let relations = relations_where(conn, "1 = 1", &[])?;
  Ok(GraphSnapshot::new(now, entities, relations))
}
