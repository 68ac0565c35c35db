//! Stale project: projects nobody has touched in a while.

use kg_core::entity::EntityType;

use super::RuleContext;
use crate::nudge::{Nudge, NudgeContext, NudgeKind, plural};

pub fn check(ctx: &RuleContext<'_>) -> Vec<Nudge> {
  let Some(threshold) = ctx.config.stale_threshold(EntityType::Project) else {
    return Vec::new();
  };
  let weight = ctx.config.weight(NudgeKind::StaleProject);

  ctx
    .not_mentioned_for(EntityType::Project, threshold)
    .map(|project| {
      let days_stale = project.days_since_mentioned(ctx.now);
      let status = project.meta_str("status").unwrap_or("unknown").to_owned();
      Nudge {
        kind:        NudgeKind::StaleProject,
        priority:    weight,
        entity_id:   project.id,
        entity_name: project.name.clone(),
        message:     format!(
          "Project \"{}\" hasn't been updated in {} (status: {status}).",
          project.name,
          plural(days_stale, "day")
        ),
        detail:      project.notes.clone(),
        anchor_at:   project.last_mentioned,
        context:     NudgeContext::StaleProject { days_stale, status },
      }
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
  fn flags_projects_past_threshold_with_status() {
    let mut g = Graph::default();
    g.entity("Rebrand", Project, 12, json!({"status": "active"}));
    g.entity("Gala", Project, 11, json!({}));
    g.entity("Annual report", Project, 2, json!({"status": "active"}));
    g.entity("Someone", Person, 50, json!({}));
    let snap = g.snapshot();
    let config = config();

    let nudges = check(&RuleContext::new(&snap, &config));
    assert_eq!(nudges.len(), 2);
    assert_eq!(
      nudges[0].message,
      "Project \"Rebrand\" hasn't been updated in 12 days (status: active)."
    );
    assert!(matches!(
      &nudges[1].context,
      NudgeContext::StaleProject { status, days_stale: 11 } if status == "unknown"
    ));
  }
}
