//! Follow-up: people who have gone quiet but matter.

use kg_core::entity::{Entity, EntityType};

use super::RuleContext;
use crate::nudge::{Nudge, NudgeContext, NudgeKind, plural};

/// A person past the staleness threshold whose strongest relation clears the
/// follow-up bar.
#[derive(Debug, Clone)]
pub struct StaleContact<'a> {
  pub entity:     &'a Entity,
  /// Strongest incident relation, `None` for a person with no relations.
  pub strength:   Option<f64>,
  pub days_stale: i64,
}

/// Follow-up candidates, strongest first, then longest silent, then by id.
pub fn stale_contacts<'a>(ctx: &RuleContext<'a>) -> Vec<StaleContact<'a>> {
  let Some(threshold) = ctx.config.stale_threshold(EntityType::Person) else {
    return Vec::new();
  };
  let min = ctx.config.min_strength_for_followup;

  let mut contacts: Vec<StaleContact<'a>> = ctx
    .not_mentioned_for(EntityType::Person, threshold)
    .filter(|e| !ctx.config.is_owner(&e.name))
    .map(|entity| StaleContact {
      strength: ctx.snapshot.max_strength(entity.id),
      days_stale: entity.days_since_mentioned(ctx.now),
      entity,
    })
    .filter(|c| c.strength.is_none_or(|s| s >= min))
    .collect();

  contacts.sort_by(|a, b| {
    b.strength
      .unwrap_or(0.0)
      .total_cmp(&a.strength.unwrap_or(0.0))
      .then(a.entity.last_mentioned.cmp(&b.entity.last_mentioned))
      .then(a.entity.id.cmp(&b.entity.id))
  });
  contacts
}

pub fn check(ctx: &RuleContext<'_>) -> Vec<Nudge> {
  let weight = ctx.config.weight(NudgeKind::FollowUp);
  stale_contacts(ctx)
    .into_iter()
    .map(|c| Nudge {
      kind:        NudgeKind::FollowUp,
      priority:    weight,
      entity_id:   c.entity.id,
      entity_name: c.entity.name.clone(),
      message:     format!(
        "You haven't mentioned {} in {}.",
        c.entity.name,
        plural(c.days_stale, "day")
      ),
      detail:      c.entity.notes.clone(),
      anchor_at:   c.entity.last_mentioned,
      context:     NudgeContext::FollowUp {
        days_stale: c.days_stale,
        strength:   c.strength.unwrap_or(0.0),
      },
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use kg_core::entity::EntityType::*;
  use serde_json::json;

  use super::*;
  use crate::rules::fixture::{Graph, config, config_with};

  #[test]
  fn strong_or_isolated_stale_people_qualify() {
    let mut g = Graph::default();
    let strong = g.entity("Strong", Person, 20, json!({}));
    let weak = g.entity("Weak", Person, 40, json!({}));
    let loner = g.entity("Loner", Person, 30, json!({}));
    let fresh = g.entity("Fresh", Person, 3, json!({}));
    let hub = g.entity("Acme", Org, 0, json!({}));
    g.relate(hub, strong, "employs", 0.9);
    g.relate(weak, hub, "knows", 0.2);
    g.relate(fresh, hub, "knows", 0.9);
    let snap = g.snapshot();
    let config = config();

    let nudges = check(&RuleContext::new(&snap, &config));
    let ids: Vec<_> = nudges.iter().map(|n| n.entity_id).collect();
    assert_eq!(ids, [strong, loner]);
    assert!(!ids.contains(&weak));
    assert_eq!(nudges[0].message, "You haven't mentioned Strong in 20 days.");
    assert_eq!(nudges[0].priority, 7.0);
  }

  #[test]
  fn owner_is_never_a_follow_up() {
    let mut g = Graph::default();
    g.entity("Adam", Person, 60, json!({}));
    let snap = g.snapshot();
    let config = config_with(json!({"owner_name": "adam"}));
    assert!(check(&RuleContext::new(&snap, &config)).is_empty());
  }
}
