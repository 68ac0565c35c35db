//! The rule-agnostic merge stage: dedupe, order, cap.

use std::collections::HashMap;

use crate::nudge::Nudge;

/// Drop duplicates (keeping the highest priority of each), then order by
/// priority descending, anchor ascending, entity id ascending.
pub fn rank(candidates: Vec<Nudge>) -> Vec<Nudge> {
  let mut best: HashMap<_, usize> = HashMap::new();
  for (i, n) in candidates.iter().enumerate() {
    best
      .entry(n.dedupe_key())
      .and_modify(|j| {
        if n.priority > candidates[*j].priority {
          *j = i;
        }
      })
      .or_insert(i);
  }
  let mut keep: Vec<usize> = best.into_values().collect();
  keep.sort_unstable();

  let mut slots: Vec<Option<Nudge>> = candidates.into_iter().map(Some).collect();
  let mut ranked: Vec<Nudge> = keep
    .into_iter()
    .filter_map(|i| slots.get_mut(i).and_then(Option::take))
    .collect();

  ranked.sort_by(|a, b| {
    b.priority
      .total_cmp(&a.priority)
      .then(a.anchor_at.cmp(&b.anchor_at))
      .then(a.entity_id.cmp(&b.entity_id))
  });
  ranked
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone as _, Utc};

  use super::*;
  use crate::nudge::{NudgeContext, NudgeKind};

  fn nudge(kind: NudgeKind, entity_id: i64, priority: f64, age_days: i64) -> Nudge {
    Nudge {
      kind,
      priority,
      entity_id,
      entity_name: format!("e{entity_id}"),
      message: String::new(),
      detail: String::new(),
      anchor_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() - Duration::days(age_days),
      context: NudgeContext::FollowUp { days_stale: age_days, strength: 0.5 },
    }
  }

  fn insight(entity_id: i64, destination: &str) -> Nudge {
    Nudge {
      context: NudgeContext::Insight {
        destination: destination.into(),
        contacts:    vec!["Ada".into()],
        days_until:  3,
      },
      ..nudge(NudgeKind::RelationshipInsight, entity_id, 5.0, 0)
    }
  }

  #[test]
  fn orders_by_priority_then_anchor_then_id() {
    let ranked = rank(vec![
      nudge(NudgeKind::FollowUp, 3, 7.0, 10),
      nudge(NudgeKind::Birthday, 9, 10.0, 0),
      nudge(NudgeKind::FollowUp, 1, 7.0, 30),
      nudge(NudgeKind::FollowUp, 2, 7.0, 30),
    ]);
    let ids: Vec<_> = ranked.iter().map(|n| n.entity_id).collect();
    assert_eq!(ids, [9, 1, 2, 3]);
  }

  #[test]
  fn duplicates_keep_the_highest_priority() {
    let ranked = rank(vec![
      nudge(NudgeKind::TravelPrep, 4, 9.0, 0),
      nudge(NudgeKind::TravelPrep, 4, 12.0, 0),
      nudge(NudgeKind::FollowUp, 4, 7.0, 0),
      insight(5, "Boston"),
      insight(5, "Boston"),
      insight(5, "Atlanta"),
    ]);
    assert_eq!(ranked.len(), 4);
    assert_eq!(ranked[0].priority, 12.0);
  }
}
