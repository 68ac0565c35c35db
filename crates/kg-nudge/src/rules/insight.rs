//! Relationship insight: people tied to a place you are about to visit.

use std::collections::BTreeSet;

use kg_core::entity::{Entity, EntityType};

use super::{RuleContext, anchor, event_start};
use crate::nudge::{Nudge, NudgeContext, NudgeKind, plural};

/// Destination words in a free-form location such as `"Boston, MA"` or
/// `"Atlanta → Cape Cod"`.
pub(crate) fn location_words(location: &str) -> Vec<String> {
  location
    .replace('→', ",")
    .split(',')
    .map(|w| w.trim().to_lowercase())
    .filter(|w| w.chars().count() > 2)
    .collect()
}

fn title_case(s: &str) -> String {
  s.split_whitespace()
    .map(|w| {
      let mut chars = w.chars();
      match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

fn people_count(n: usize) -> String {
  if n == 1 { "1 person".to_owned() } else { format!("{n} people") }
}

/// People (other than the owner) with a relation to `place`, by name.
fn people_at<'a>(ctx: &RuleContext<'a>, place: &Entity) -> BTreeSet<&'a str> {
  ctx
    .snapshot
    .incident(place.id)
    .filter_map(|r| r.other_end(place.id))
    .filter_map(|id| ctx.snapshot.entity(id))
    .filter(|e| e.entity_type == EntityType::Person && !ctx.config.is_owner(&e.name))
    .map(|e| e.name.as_str())
    .collect()
}

pub fn check(ctx: &RuleContext<'_>) -> Vec<Nudge> {
  let weight = ctx.config.weight(NudgeKind::RelationshipInsight);
  let window = i64::from(ctx.config.insight_window_days);
  let today = ctx.today();
  let mut nudges = Vec::new();

  for event in ctx.snapshot.of_type(EntityType::Event) {
    let Some(start) = event_start(event) else { continue };
    let days_until = (start - today).num_days();
    if !(0..=window).contains(&days_until) {
      continue;
    }
    let Some(location) = event.meta_str("location") else { continue };

    for word in location_words(location) {
      let contacts: BTreeSet<&str> = ctx
        .snapshot
        .of_type(EntityType::Place)
        .filter(|place| place.name.to_lowercase().contains(&word))
        .flat_map(|place| people_at(ctx, place))
        .collect();
      if contacts.is_empty() {
        continue;
      }

      let destination = title_case(&word);
      let contacts: Vec<String> = contacts.into_iter().map(str::to_owned).collect();
      nudges.push(Nudge {
        kind:        NudgeKind::RelationshipInsight,
        priority:    weight,
        entity_id:   event.id,
        entity_name: event.name.clone(),
        message:     format!(
          "You know {} near {destination}: {}",
          people_count(contacts.len()),
          contacts.join(", ")
        ),
        detail:      format!("{} starts in {}.", event.name, plural(days_until, "day")),
        anchor_at:   anchor(start),
        context:     NudgeContext::Insight { destination, contacts, days_until },
      });
    }
  }
  nudges
}

#[cfg(test)]
mod tests {
  use kg_core::entity::EntityType::*;
  use serde_json::json;

  use super::*;
  use crate::rules::fixture::{Graph, config, config_with};

  #[test]
  fn splits_locations() {
    assert_eq!(location_words("Boston, MA"), ["boston"]);
    assert_eq!(location_words("Atlanta → Cape Cod"), ["atlanta", "cape cod"]);
  }

  #[test]
  fn finds_people_tied_to_destination() {
    let mut g = Graph::default();
    g.entity("Conference", Event, 0, json!({"start_date": "2026-03-10", "location": "Boston, MA"}));
    g.entity("Far trip", Event, 0, json!({"start_date": "2026-06-10", "location": "Boston"}));
    let boston = g.entity("Boston", Place, 0, json!({}));
    let ada = g.entity("Ada", Person, 0, json!({}));
    let bea = g.entity("Bea", Person, 0, json!({}));
    let owner = g.entity("Owner", Person, 0, json!({}));
    let acme = g.entity("Acme", Org, 0, json!({}));
    g.relate(bea, boston, "lives_in", 0.8);
    g.relate(boston, ada, "home_of", 0.8);
    g.relate(owner, boston, "visits", 0.5);
    g.relate(acme, boston, "based_in", 0.5);
    let snap = g.snapshot();
    let config = config_with(json!({"owner_name": "Owner"}));

    let nudges = check(&RuleContext::new(&snap, &config));
    assert_eq!(nudges.len(), 1);
    assert_eq!(nudges[0].entity_name, "Conference");
    assert_eq!(nudges[0].message, "You know 2 people near Boston: Ada, Bea");
    assert!(matches!(
      &nudges[0].context,
      NudgeContext::Insight { destination, days_until: 9, .. } if destination == "Boston"
    ));
  }

  #[test]
  fn no_contacts_no_insight() {
    let mut g = Graph::default();
    g.entity("Trip", Event, 0, json!({"start_date": "2026-03-05", "location": "Lisbon"}));
    g.entity("Lisbon", Place, 0, json!({}));
    let snap = g.snapshot();
    let config = config();
    assert!(check(&RuleContext::new(&snap, &config)).is_empty());
  }
}
