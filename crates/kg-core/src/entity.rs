//! Entities: the typed, named nodes of the knowledge graph.
//!
//! An entity is identified by a surrogate integer id, but callers usually
//! address it by name. `(name, type)` is unique with the name compared
//! case-insensitively, so "Cape Cod" the place and "Cape Cod" the project
//! coexist while two places called "cape cod" cannot.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  Error, Result,
  metadata::{self, Metadata},
  relation::IncidentRelation,
};

/// Surrogate key assigned by the store on creation.
pub type EntityId = i64;

/// Default confidence for an entity created without one.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Longest accepted entity name, in characters.
pub const MAX_NAME_LEN: usize = 256;

// ─── Type ────────────────────────────────────────────────────────────────────

/// The closed set of things the graph knows about.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
  strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityType {
  Person,
  Org,
  Project,
  Place,
  Event,
  Topic,
  Skill,
}

impl EntityType {
  pub fn as_str(self) -> &'static str { self.into() }

  /// Parse a caller-supplied type name, surrounding whitespace allowed.
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s.trim()).map_err(|_| Error::UnknownEntityType(s.to_owned()))
  }
}

// ─── Stored entity ───────────────────────────────────────────────────────────

/// An entity as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  pub id:             EntityId,
  pub name:           String,
  #[serde(rename = "type")]
  pub entity_type:    EntityType,
  pub metadata:       Metadata,
  pub notes:          String,
  pub confidence:     f64,
  pub mention_count:  i64,
  /// Write-once: set on creation, never touched again.
  pub first_seen:     DateTime<Utc>,
  pub last_seen:      DateTime<Utc>,
  pub last_mentioned: DateTime<Utc>,
}

impl Entity {
  /// Whole days elapsed since the entity was last mentioned.
  pub fn days_since_mentioned(&self, now: DateTime<Utc>) -> i64 {
    (now - self.last_mentioned).num_days()
  }

  /// Look up a dotted path (`important_dates.birthday`) in the metadata.
  pub fn meta(&self, path: &str) -> Option<&Value> { metadata::lookup(&self.metadata, path) }

  /// Like [`Entity::meta`] but only for string values.
  pub fn meta_str(&self, path: &str) -> Option<&str> { self.meta(path).and_then(Value::as_str) }
}

// ─── Upsert input ────────────────────────────────────────────────────────────

/// Input to [`GraphStore::upsert_entity`](crate::store::GraphStore::upsert_entity).
///
/// `None` fields leave the stored value untouched on update; on create they
/// fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntity {
  pub name:        String,
  #[serde(rename = "type")]
  pub entity_type: EntityType,
  #[serde(default)]
  pub notes:       Option<String>,
  #[serde(default)]
  pub metadata:    Option<Metadata>,
  #[serde(default)]
  pub confidence:  Option<f64>,
}

impl NewEntity {
  pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
    Self {
      name: name.into(),
      entity_type,
      notes: None,
      metadata: None,
      confidence: None,
    }
  }

  pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
    self.notes = Some(notes.into());
    self
  }

  pub fn with_metadata(mut self, metadata: Metadata) -> Self {
    self.metadata = Some(metadata);
    self
  }

  pub fn with_confidence(mut self, confidence: f64) -> Self {
    self.confidence = Some(confidence);
    self
  }

  /// Trim the name and check every supplied field against its bounds.
  pub fn normalized(mut self) -> Result<Self> {
    self.name = normalize_name(&self.name)?;
    if let Some(c) = self.confidence {
      check_unit_interval("confidence", c)?;
    }
    if let Some(m) = &self.metadata {
      metadata::validate(m)?;
    }
    // Empty notes carry no information; treat them as absent.
    if self.notes.as_deref().is_some_and(|n| n.trim().is_empty()) {
      self.notes = None;
    }
    Ok(self)
  }
}

pub(crate) fn normalize_name(name: &str) -> Result<String> {
  let name = name.trim();
  if name.is_empty() {
    return Err(Error::validation("name is required"));
  }
  if name.chars().count() > MAX_NAME_LEN {
    return Err(Error::validation(format!("name longer than {MAX_NAME_LEN} characters")));
  }
  Ok(name.to_owned())
}

/// Reject values outside `[0, 1]` (and NaN).
pub fn check_unit_interval(field: &str, value: f64) -> Result<()> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(Error::validation(format!("{field} must be within [0, 1], got {value}")))
  }
}

// ─── Upsert outcome ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
  Created,
  Updated,
}

/// The stored entity after an upsert, and whether it was new.
#[derive(Debug, Clone, Serialize)]
pub struct EntityUpsert {
  pub action: UpsertAction,
  pub entity: Entity,
}

/// An entity with all of its incident relations resolved.
#[derive(Debug, Clone, Serialize)]
pub struct EntityDetail {
  #[serde(flatten)]
  pub entity:        Entity,
  pub relationships: Vec<IncidentRelation>,
}

/// The entity removed by a delete, and how many relations went with it.
#[derive(Debug, Clone, Serialize)]
pub struct DeletedEntity {
  pub entity:            Entity,
  pub relations_removed: usize,
}

// ─── References ──────────────────────────────────────────────────────────────

/// How a caller points at an existing entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
  Id(EntityId),
  /// A case-insensitive name, optionally narrowed to one type.
  Name {
    name:        String,
    entity_type: Option<EntityType>,
  },
}

impl EntityRef {
  pub fn name(name: impl Into<String>) -> Self {
    Self::Name { name: name.into(), entity_type: None }
  }

  pub fn typed(name: impl Into<String>, entity_type: EntityType) -> Self {
    Self::Name { name: name.into(), entity_type: Some(entity_type) }
  }

  /// Interpret a JSON reference: an integer id, a digit string, a bare name,
  /// or an object `{"name": ..., "type": ...}` (or `{"id": ...}`).
  pub fn from_json(value: &Value) -> Result<Self> {
    match value {
      Value::Number(n) => n
        .as_i64()
        .map(Self::Id)
        .ok_or_else(|| Error::validation(format!("invalid entity id: {n}"))),
      Value::String(s) => Self::from_str(s),
      Value::Object(obj) => {
        if let Some(id) = obj.get("id") {
          return Self::from_json(id);
        }
        let name = obj
          .get("name")
          .and_then(Value::as_str)
          .ok_or_else(|| Error::validation("entity reference needs an id or a name"))?;
        let entity_type = obj
          .get("type")
          .and_then(Value::as_str)
          .map(EntityType::parse)
          .transpose()?;
        Ok(Self::Name { name: normalize_name(name)?, entity_type })
      }
      other => Err(Error::validation(format!("invalid entity reference: {other}"))),
    }
  }
}

impl FromStr for EntityRef {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let s = s.trim();
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
      return s
        .parse()
        .map(Self::Id)
        .map_err(|_| Error::validation(format!("invalid entity id: {s}")));
    }
    Ok(Self::name(normalize_name(s)?))
  }
}

impl fmt::Display for EntityRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Id(id) => write!(f, "#{id}"),
      Self::Name { name, entity_type: None } => write!(f, "{name:?}"),
      Self::Name { name, entity_type: Some(t) } => write!(f, "{t} {name:?}"),
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn entity_type_names_round_trip() {
    for t in EntityType::iter() {
      assert_eq!(EntityType::parse(t.as_str()).unwrap(), t);
    }
    assert_eq!(EntityType::parse(" org ").unwrap(), EntityType::Org);
    assert!(matches!(
      EntityType::parse("company"),
      Err(Error::UnknownEntityType(_))
    ));
  }

  #[test]
  fn normalized_trims_name_and_drops_blank_notes() {
    let e = NewEntity::new("  John Smith ", EntityType::Person)
      .with_notes("   ")
      .normalized()
      .unwrap();
    assert_eq!(e.name, "John Smith");
    assert_eq!(e.notes, None);
  }

  #[test]
  fn normalized_rejects_out_of_range_confidence() {
    for bad in [-0.1, 1.01, f64::NAN] {
      let err = NewEntity::new("X", EntityType::Topic)
        .with_confidence(bad)
        .normalized()
        .unwrap_err();
      assert!(matches!(err, Error::Validation(_)), "{bad} accepted");
    }
  }

  #[test]
  fn normalized_rejects_empty_name() {
    assert!(NewEntity::new("  ", EntityType::Place).normalized().is_err());
  }

  #[test]
  fn entity_ref_from_json_variants() {
    assert_eq!(EntityRef::from_json(&json!(7)).unwrap(), EntityRef::Id(7));
    assert_eq!(EntityRef::from_json(&json!("42")).unwrap(), EntityRef::Id(42));
    assert_eq!(
      EntityRef::from_json(&json!("Cape Cod")).unwrap(),
      EntityRef::name("Cape Cod")
    );
    assert_eq!(
      EntityRef::from_json(&json!({"name": "Cape Cod", "type": "place"})).unwrap(),
      EntityRef::typed("Cape Cod", EntityType::Place)
    );
    assert_eq!(EntityRef::from_json(&json!({"id": 3})).unwrap(), EntityRef::Id(3));
    assert!(EntityRef::from_json(&json!(true)).is_err());
    assert!(EntityRef::from_json(&json!({"name": "X", "type": "planet"})).is_err());
  }
}
