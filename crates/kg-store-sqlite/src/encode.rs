//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that lexical order is chronological order.
//! Metadata documents are stored as compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use kg_core::{
  changelog::{ChangeAction, ChangelogEntry},
  entity::{Entity, EntityType},
  metadata::Metadata,
  relation::Relation,
};
use rusqlite::Row;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Names ───────────────────────────────────────────────────────────────────

/// The case-folded form `(name, type)` uniqueness is enforced on.
pub fn name_key(name: &str) -> String { name.trim().to_lowercase() }

// ─── Metadata ────────────────────────────────────────────────────────────────

pub fn encode_metadata(m: &Metadata) -> Result<String> { Ok(serde_json::to_string(m)?) }

pub fn decode_metadata(s: &str) -> Result<Metadata> {
  if s.is_empty() {
    return Ok(Metadata::new());
  }
  Ok(serde_json::from_str(s)?)
}

// ─── Enumerations ────────────────────────────────────────────────────────────

pub fn decode_entity_type(s: &str) -> Result<EntityType> {
  EntityType::parse(s).map_err(|_| Error::Corrupt(format!("unknown entity type: {s:?}")))
}

pub fn decode_action(s: &str) -> Result<ChangeAction> {
  s.parse()
    .map_err(|_| Error::Corrupt(format!("unknown changelog action: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawEntity::from_row`]; tables are aliased `e`.
pub const ENTITY_COLUMNS: &str = "e.id, e.name, e.type, e.metadata, e.notes, e.confidence, \
                                  e.mention_count, e.first_seen, e.last_seen, e.last_mentioned";

/// Column list matching [`RawRelation::from_row`]; tables are aliased `r`.
pub const RELATION_COLUMNS: &str = "r.id, r.source_id, r.target_id, r.type, r.strength, \
                                    r.bidirectional, r.metadata, r.last_confirmed";

/// Raw values read directly from an `entities` row.
pub struct RawEntity {
  pub id:             i64,
  pub name:           String,
  pub entity_type:    String,
  pub metadata:       String,
  pub notes:          String,
  pub confidence:     f64,
  pub mention_count:  i64,
  pub first_seen:     String,
  pub last_seen:      String,
  pub last_mentioned: String,
}

impl RawEntity {
  /// Read the [`ENTITY_COLUMNS`] starting at column `offset`.
  pub fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(offset)?,
      name:           row.get(offset + 1)?,
      entity_type:    row.get(offset + 2)?,
      metadata:       row.get(offset + 3)?,
      notes:          row.get(offset + 4)?,
      confidence:     row.get(offset + 5)?,
      mention_count:  row.get(offset + 6)?,
      first_seen:     row.get(offset + 7)?,
      last_seen:      row.get(offset + 8)?,
      last_mentioned: row.get(offset + 9)?,
    })
  }

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> { Self::from_row_at(row, 0) }

  pub fn into_entity(self) -> Result<Entity> {
    Ok(Entity {
      id:             self.id,
      name:           self.name,
      entity_type:    decode_entity_type(&self.entity_type)?,
      metadata:       decode_metadata(&self.metadata)?,
      notes:          self.notes,
      confidence:     self.confidence,
      mention_count:  self.mention_count,
      first_seen:     decode_dt(&self.first_seen)?,
      last_seen:      decode_dt(&self.last_seen)?,
      last_mentioned: decode_dt(&self.last_mentioned)?,
    })
  }
}

/// Raw values read directly from a `relations` row.
pub struct RawRelation {
  pub id:             i64,
  pub source_id:      i64,
  pub target_id:      i64,
  pub relation_type:  String,
  pub strength:       f64,
  pub bidirectional:  bool,
  pub metadata:       String,
  pub last_confirmed: String,
}

impl RawRelation {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      source_id:      row.get(1)?,
      target_id:      row.get(2)?,
      relation_type:  row.get(3)?,
      strength:       row.get(4)?,
      bidirectional:  row.get(5)?,
      metadata:       row.get(6)?,
      last_confirmed: row.get(7)?,
    })
  }

  pub fn into_relation(self) -> Result<Relation> {
    Ok(Relation {
      id:             self.id,
      source_id:      self.source_id,
      target_id:      self.target_id,
      relation_type:  self.relation_type,
      strength:       self.strength,
      bidirectional:  self.bidirectional,
      metadata:       decode_metadata(&self.metadata)?,
      last_confirmed: decode_dt(&self.last_confirmed)?,
    })
  }
}

/// Raw values read directly from a `changelog` row.
pub struct RawChange {
  pub id:          i64,
  pub ts:          String,
  pub action:      String,
  pub entity_id:   Option<i64>,
  pub relation_id: Option<i64>,
  pub detail:      String,
}

impl RawChange {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      ts:          row.get(1)?,
      action:      row.get(2)?,
      entity_id:   row.get(3)?,
      relation_id: row.get(4)?,
      detail:      row.get(5)?,
    })
  }

  pub fn into_entry(self) -> Result<ChangelogEntry> {
    Ok(ChangelogEntry {
      id:          self.id,
      ts:          decode_dt(&self.ts)?,
      action:      decode_action(&self.action)?,
      entity_id:   self.entity_id,
      relation_id: self.relation_id,
      detail:      self.detail,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone as _};

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
    let b = a + Duration::microseconds(1);
    let c = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
    assert!(encode_dt(a) < encode_dt(b));
    assert!(encode_dt(b) < encode_dt(c));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn name_key_folds_case_and_whitespace() {
    assert_eq!(name_key(" Cape Cod "), "cape cod");
    assert_eq!(name_key("ÉCOLE"), "école");
  }

  #[test]
  fn unknown_stored_type_is_corrupt() {
    assert!(matches!(decode_entity_type("planet"), Err(Error::Corrupt(_))));
  }
}
