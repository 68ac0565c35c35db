//! Nudges: prioritised notices produced by the rules.

use chrono::{DateTime, NaiveDate, Utc};
use kg_core::entity::EntityId;
use serde::{Deserialize, Serialize};

/// The six rule families. The serialised name doubles as the key in the
/// `priority_weights` configuration map.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NudgeKind {
  Birthday,
  TravelPrep,
  FollowUp,
  StaleProject,
  RelationshipInsight,
  Opportunity,
}

impl NudgeKind {
  pub fn as_str(self) -> &'static str { self.into() }

  /// Weight used when a configuration does not say otherwise.
  pub fn default_weight(self) -> f64 {
    match self {
      Self::Birthday => 10.0,
      Self::TravelPrep => 9.0,
      Self::FollowUp => 7.0,
      Self::StaleProject => 6.0,
      Self::RelationshipInsight => 5.0,
      Self::Opportunity => 4.0,
    }
  }
}

/// How close an upcoming trip is, relative to the configured alert tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Urgency {
  Imminent,
  Soon,
  Upcoming,
}

impl Urgency {
  /// Added on top of the travel weight.
  pub fn boost(self) -> f64 {
    match self {
      Self::Imminent => 3.0,
      Self::Soon => 1.0,
      Self::Upcoming => 0.0,
    }
  }
}

/// Rule-specific fields, flattened into the nudge when serialised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NudgeContext {
  Birthday {
    days_until: i64,
    date:       NaiveDate,
  },
  Travel {
    days_until: i64,
    urgency:    Urgency,
    start_date: NaiveDate,
  },
  FollowUp {
    days_stale: i64,
    strength:   f64,
  },
  StaleProject {
    days_stale: i64,
    status:     String,
  },
  Insight {
    destination: String,
    contacts:    Vec<String>,
    days_until:  i64,
  },
  Opportunity {
    needs:            Vec<String>,
    matched_keywords: Vec<String>,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Nudge {
  #[serde(rename = "type")]
  pub kind:        NudgeKind,
  pub priority:    f64,
  pub entity_id:   EntityId,
  pub entity_name: String,
  pub message:     String,
  pub detail:      String,
  /// Secondary ordering key: earlier anchors rank first among equal
  /// priorities (the sooner date, or the longer silence).
  pub anchor_at:   DateTime<Utc>,
  #[serde(flatten)]
  pub context:     NudgeContext,
}

impl Nudge {
  /// Candidates sharing this key are duplicates; only the highest priority
  /// one survives ranking.
  pub fn dedupe_key(&self) -> (NudgeKind, EntityId, Option<&str>) {
    let qualifier = match &self.context {
      NudgeContext::Insight { destination, .. } => Some(destination.as_str()),
      _ => None,
    };
    (self.kind, self.entity_id, qualifier)
  }
}

pub(crate) fn plural(n: i64, unit: &str) -> String {
  if n == 1 { format!("{n} {unit}") } else { format!("{n} {unit}s") }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;
  use serde_json::json;

  use super::*;

  #[test]
  fn serialises_flat_with_rule_fields() {
    let nudge = Nudge {
      kind:        NudgeKind::TravelPrep,
      priority:    10.0,
      entity_id:   4,
      entity_name: "Trip A".into(),
      message:     "Trip A is in 3 days (soon)".into(),
      detail:      String::new(),
      anchor_at:   Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap(),
      context:     NudgeContext::Travel {
        days_until: 3,
        urgency:    Urgency::Soon,
        start_date: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
      },
    };
    let v = serde_json::to_value(&nudge).unwrap();
    assert_eq!(v["type"], json!("travel_prep"));
    assert_eq!(v["urgency"], json!("soon"));
    assert_eq!(v["days_until"], json!(3));
    assert_eq!(v["start_date"], json!("2026-03-04"));
  }

  #[test]
  fn kind_names_match_weight_keys() {
    assert_eq!(NudgeKind::RelationshipInsight.as_str(), "relationship_insight");
    assert_eq!("stale_project".parse::<NudgeKind>().unwrap(), NudgeKind::StaleProject);
  }
}
