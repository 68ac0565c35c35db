//! Command names and their argument payloads.

use kg_core::{
  entity::{EntityRef, EntityType},
  metadata::Metadata,
  relation::NewRelation,
  store::EntityQuery,
};
use kg_nudge::NudgeKind;
use serde::Deserialize;
use serde_json::Value;

/// Every command the boundary accepts, by wire name.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  strum::Display,
  strum::EnumString,
  strum::EnumIter,
  strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
  // Graph
  Init,
  UpsertEntity,
  UpsertRelation,
  Query,
  Get,
  Stats,
  Stale,
  Neighbors,
  DeleteEntity,
  Changelog,
  // Nudges
  CheckAll,
  CheckFollowups,
  CheckTravel,
  CheckBirthdays,
  CheckStaleProjects,
  CheckInsights,
  CheckOpportunities,
  MorningBriefing,
  RelationshipReview,
}

impl Command {
  pub fn as_str(self) -> &'static str { self.into() }

  /// The rule behind a `check_<rule>` command.
  pub fn rule(self) -> Option<NudgeKind> {
    match self {
      Self::CheckFollowups => Some(NudgeKind::FollowUp),
      Self::CheckTravel => Some(NudgeKind::TravelPrep),
      Self::CheckBirthdays => Some(NudgeKind::Birthday),
      Self::CheckStaleProjects => Some(NudgeKind::StaleProject),
      Self::CheckInsights => Some(NudgeKind::RelationshipInsight),
      Self::CheckOpportunities => Some(NudgeKind::Opportunity),
      _ => None,
    }
  }

  /// Whether the command reads the nudge rules configuration.
  pub fn needs_rules(self) -> bool {
    self.rule().is_some()
      || matches!(self, Self::CheckAll | Self::MorningBriefing | Self::RelationshipReview)
  }
}

// ─── Argument payloads ───────────────────────────────────────────────────────

fn default_stale_days() -> u32 { 14 }
fn default_hops() -> u32 { 1 }
fn default_changelog_limit() -> usize { 50 }

#[derive(Debug, Deserialize)]
pub struct RelationArgs {
  #[serde(alias = "source_id")]
  pub source:        Value,
  #[serde(alias = "target_id")]
  pub target:        Value,
  #[serde(rename = "type")]
  pub relation_type: String,
  #[serde(default)]
  pub strength:      Option<f64>,
  #[serde(default)]
  pub bidirectional: Option<bool>,
  #[serde(default)]
  pub metadata:      Option<Metadata>,
}

impl RelationArgs {
  pub fn into_new_relation(self) -> kg_core::Result<NewRelation> {
    Ok(NewRelation {
      source:        EntityRef::from_json(&self.source)?,
      target:        EntityRef::from_json(&self.target)?,
      relation_type: self.relation_type,
      strength:      self.strength,
      bidirectional: self.bidirectional,
      metadata:      self.metadata,
    })
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryArgs {
  #[serde(rename = "type", default)]
  pub entity_type: Option<EntityType>,
  #[serde(default)]
  pub text:        Option<String>,
  #[serde(default)]
  pub metadata:    Metadata,
  #[serde(default)]
  pub limit:       Option<usize>,
  #[serde(default)]
  pub offset:      Option<usize>,
}

impl From<QueryArgs> for EntityQuery {
  fn from(args: QueryArgs) -> Self {
    EntityQuery {
      entity_type: args.entity_type,
      text:        args.text,
      metadata:    args.metadata,
      limit:       args.limit,
      offset:      args.offset,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct StaleArgs {
  #[serde(default = "default_stale_days")]
  pub days:        u32,
  #[serde(rename = "type", default)]
  pub entity_type: Option<EntityType>,
}

/// The entity itself is named by `id`, or `name` plus an optional `type`,
/// in the same payload.
#[derive(Debug, Deserialize)]
pub struct NeighborsArgs {
  #[serde(default = "default_hops")]
  pub hops:        u32,
  #[serde(default)]
  pub filter_type: Option<EntityType>,
}

#[derive(Debug, Deserialize)]
pub struct ChangelogArgs {
  #[serde(default = "default_changelog_limit")]
  pub limit: usize,
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn command_names_round_trip() {
    for c in Command::iter() {
      assert_eq!(c.as_str().parse::<Command>().unwrap(), c);
    }
    assert_eq!(Command::CheckStaleProjects.as_str(), "check_stale_projects");
    assert!("drop_tables".parse::<Command>().is_err());
  }

  #[test]
  fn every_rule_has_a_check_command() {
    let rules: Vec<_> = Command::iter().filter_map(Command::rule).collect();
    assert_eq!(rules.len(), NudgeKind::iter().count());
    assert!(Command::MorningBriefing.needs_rules());
    assert!(!Command::Stats.needs_rules());
  }

  #[test]
  fn relation_args_accept_id_aliases() {
    let args: RelationArgs = serde_json::from_value(json!({
      "source_id": 1,
      "target": {"name": "Ada", "type": "person"},
      "type": "knows",
    }))
    .unwrap();
    let rel = args.into_new_relation().unwrap();
    assert_eq!(rel.source, EntityRef::Id(1));
    assert_eq!(rel.target, EntityRef::typed("Ada", EntityType::Person));
    assert_eq!(rel.strength, None);
  }

  #[test]
  fn argument_defaults() {
    let stale: StaleArgs = serde_json::from_value(json!({})).unwrap();
    assert_eq!(stale.days, 14);
    let hops: NeighborsArgs = serde_json::from_value(json!({"name": "Ada"})).unwrap();
    assert_eq!(hops.hops, 1);
    let log: ChangelogArgs = serde_json::from_value(json!({})).unwrap();
    assert_eq!(log.limit, 50);
  }
}
