//! Travel prep: events starting within the alert tiers.

use kg_core::entity::EntityType;

use super::{RuleContext, anchor, event_start};
use crate::nudge::{Nudge, NudgeContext, NudgeKind, Urgency, plural};

/// Place `days_until` in the ascending `tiers`: the smallest tier is
/// imminent, the next one soon, anything further out upcoming.
pub(crate) fn urgency(tiers: &[u32], days_until: i64) -> Urgency {
  let within = |i: usize| tiers.get(i).is_some_and(|&t| days_until <= i64::from(t));
  if within(0) {
    Urgency::Imminent
  } else if within(1) {
    Urgency::Soon
  } else {
    Urgency::Upcoming
  }
}

pub fn check(ctx: &RuleContext<'_>) -> Vec<Nudge> {
  let tiers = &ctx.config.travel_alert_days;
  let Some(&horizon) = tiers.last() else {
    return Vec::new();
  };
  let weight = ctx.config.weight(NudgeKind::TravelPrep);
  let today = ctx.today();

  ctx
    .snapshot
    .of_type(EntityType::Event)
    .filter_map(|event| {
      let start_date = event_start(event)?;
      let days_until = (start_date - today).num_days();
      if !(0..=i64::from(horizon)).contains(&days_until) {
        return None;
      }
      let urgency = urgency(tiers, days_until);
      let when = match days_until {
        0 => "today".to_owned(),
        n => format!("in {}", plural(n, "day")),
      };
      Some(Nudge {
        kind:        NudgeKind::TravelPrep,
        priority:    weight + urgency.boost(),
        entity_id:   event.id,
        entity_name: event.name.clone(),
        message:     format!("{} is {when} ({urgency}).", event.name),
        detail:      event.notes.clone(),
        anchor_at:   anchor(start_date),
        context:     NudgeContext::Travel { days_until, urgency, start_date },
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use kg_core::entity::EntityType::*;
  use serde_json::json;

  use super::*;
  use crate::rules::fixture::{Graph, config};

  #[test]
  fn urgency_tiers() {
    let tiers = [1, 3, 7];
    assert_eq!(urgency(&tiers, 0), Urgency::Imminent);
    assert_eq!(urgency(&tiers, 1), Urgency::Imminent);
    assert_eq!(urgency(&tiers, 3), Urgency::Soon);
    assert_eq!(urgency(&tiers, 6), Urgency::Upcoming);
    assert_eq!(urgency(&[5], 4), Urgency::Imminent);
    assert_eq!(urgency(&[2, 10], 9), Urgency::Soon);
  }

  #[test]
  fn trip_three_days_out_is_soon() {
    // Fixture "now" is 2026-03-01.
    let mut g = Graph::default();
    g.entity("Trip A", Event, 0, json!({"start_date": "2026-03-04"}));
    g.entity("Trip B", Event, 0, json!({"start_date": "2026-03-20"}));
    g.entity("Trip C", Event, 0, json!({"start_date": "2026-02-20"}));
    g.entity("Trip D", Event, 0, json!({"start_date": "soon"}));
    g.entity("Trip E", Event, 0, json!({"start_date": "2026-03-02T09:00:00Z"}));
    let snap = g.snapshot();
    let config = config();

    let nudges = check(&RuleContext::new(&snap, &config));
    assert_eq!(nudges.len(), 2);

    let a = &nudges[0];
    assert_eq!(a.entity_name, "Trip A");
    assert_eq!(a.priority, 10.0);
    assert_eq!(a.message, "Trip A is in 3 days (soon).");
    assert!(matches!(
      a.context,
      NudgeContext::Travel { days_until: 3, urgency: Urgency::Soon, .. }
    ));

    let e = &nudges[1];
    assert_eq!(e.priority, 12.0);
    assert!(matches!(e.context, NudgeContext::Travel { urgency: Urgency::Imminent, .. }));
  }
}
