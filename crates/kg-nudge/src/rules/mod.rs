//! The nudge rules.
//!
//! Each rule is a pure function from a [`RuleContext`] to candidate nudges.
//! Rules never rank, cap or filter against each other; that happens in
//! [`crate::rank`], so adding a rule means adding a module and a registry
//! entry and nothing else.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use kg_core::{
  entity::{Entity, EntityType},
  snapshot::GraphSnapshot,
};

use crate::{
  config::NudgeConfig,
  nudge::{Nudge, NudgeKind},
};

mod birthday;
mod follow_up;
mod insight;
mod opportunity;
mod stale_project;
mod travel;

pub use follow_up::{StaleContact, stale_contacts};

/// Everything a rule may look at.
pub struct RuleContext<'a> {
  pub snapshot: &'a GraphSnapshot,
  pub config:   &'a NudgeConfig,
  pub now:      DateTime<Utc>,
}

impl<'a> RuleContext<'a> {
  pub fn new(snapshot: &'a GraphSnapshot, config: &'a NudgeConfig) -> Self {
    Self { snapshot, config, now: snapshot.taken_at }
  }

  /// Today's date in the configured offset.
  pub fn today(&self) -> NaiveDate { self.config.local_date(self.now) }

  /// Entities of `entity_type` last mentioned more than `days` ago.
  fn not_mentioned_for(&self, entity_type: EntityType, days: u32) -> impl Iterator<Item = &'a Entity> {
    let cutoff = self.now - Duration::days(i64::from(days));
    self
      .snapshot
      .of_type(entity_type)
      .filter(move |e| e.last_mentioned < cutoff)
  }
}

pub type Rule = fn(&RuleContext<'_>) -> Vec<Nudge>;

pub fn rule(kind: NudgeKind) -> Rule {
  match kind {
    NudgeKind::Birthday => birthday::check,
    NudgeKind::TravelPrep => travel::check,
    NudgeKind::FollowUp => follow_up::check,
    NudgeKind::StaleProject => stale_project::check,
    NudgeKind::RelationshipInsight => insight::check,
    NudgeKind::Opportunity => opportunity::check,
  }
}

// ─── Shared helpers ──────────────────────────────────────────────────────────

/// Parse a date given as `YYYY-MM-DD` or as an RFC 3339 timestamp.
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
  let s = s.trim();
  NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().or_else(|| {
    DateTime::parse_from_rfc3339(s)
      .ok()
      .map(|dt| dt.date_naive())
  })
}

/// Midnight UTC of `date`, used as an ordering anchor.
pub(crate) fn anchor(date: NaiveDate) -> DateTime<Utc> {
  date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// The start date of an event, if it has a readable one.
pub(crate) fn event_start(event: &Entity) -> Option<NaiveDate> {
  event.meta_str("start_date").and_then(parse_date)
}

#[cfg(test)]
pub(crate) mod fixture {
  //! Hand-built snapshots for rule tests.

  use chrono::{DateTime, Duration, TimeZone as _, Utc};
  use kg_core::{
    entity::{Entity, EntityId, EntityType},
    metadata::Metadata,
    relation::Relation,
    snapshot::GraphSnapshot,
  };
  use serde_json::Value;

  use crate::config::{NudgeConfig, tests::sample};

  /// 2026-03-01 12:00 UTC.
  pub fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() }

  pub fn config() -> NudgeConfig { NudgeConfig::from_value(sample()).unwrap() }

  pub fn config_with(patch: Value) -> NudgeConfig {
    let mut v = sample();
    if let (Some(base), Some(extra)) = (v.as_object_mut(), patch.as_object()) {
      for (k, val) in extra {
        base.insert(k.clone(), val.clone());
      }
    }
    NudgeConfig::from_value(v).unwrap()
  }

  #[derive(Default)]
  pub struct Graph {
    entities:  Vec<Entity>,
    relations: Vec<Relation>,
  }

  impl Graph {
    /// Add an entity last mentioned `days_ago` days before [`now`].
    pub fn entity(&mut self, name: &str, t: EntityType, days_ago: i64, metadata: Value) -> EntityId {
      let id = self.entities.len() as EntityId + 1;
      let at = now() - Duration::days(days_ago);
      self.entities.push(Entity {
        id,
        name: name.into(),
        entity_type: t,
        metadata: metadata.as_object().cloned().unwrap_or_else(Metadata::new),
        notes: String::new(),
        confidence: 0.8,
        mention_count: 1,
        first_seen: at,
        last_seen: at,
        last_mentioned: at,
      });
      id
    }

    pub fn relate(&mut self, source_id: EntityId, target_id: EntityId, t: &str, strength: f64) {
      self.relations.push(Relation {
        id: self.relations.len() as i64 + 1,
        source_id,
        target_id,
        relation_type: t.into(),
        strength,
        bidirectional: false,
        metadata: Metadata::new(),
        last_confirmed: now(),
      });
    }

    pub fn snapshot(self) -> GraphSnapshot { GraphSnapshot::new(now(), self.entities, self.relations) }
  }
}
