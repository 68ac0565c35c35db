//! [`NudgeEngine`]: evaluates the rules against a store snapshot.

use chrono::{DateTime, Utc};
use kg_core::{
  entity::{EntityId, EntityType},
  snapshot::GraphSnapshot,
  store::{GraphStats, GraphStore},
};
use serde::Serialize;
use strum::IntoEnumIterator as _;

use crate::{
  config::NudgeConfig,
  nudge::{Nudge, NudgeKind},
  rank::rank,
  rules::{self, RuleContext, stale_contacts},
};

/// Contacts returned by [`NudgeEngine::relationship_review`].
pub const REVIEW_SIZE: usize = 5;
/// Connections listed per reviewed contact.
pub const REVIEW_CONNECTIONS: usize = 5;

// ─── Reports ─────────────────────────────────────────────────────────────────

/// The outcome of `check_all`.
#[derive(Debug, Clone, Serialize)]
pub struct NudgeReport {
  pub nudges:      Vec<Nudge>,
  /// Candidates after deduplication, before the daily cap.
  pub total:       usize,
  pub shown:       usize,
  /// Whether output was suppressed because of quiet hours.
  pub quiet_hours: bool,
}

/// The outcome of a single-rule check.
#[derive(Debug, Clone, Serialize)]
pub struct RuleReport {
  pub nudges: Vec<Nudge>,
  pub count:  usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MorningBriefing {
  pub timestamp: DateTime<Utc>,
  pub stats:     GraphStats,
  #[serde(flatten)]
  pub report:    NudgeReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct Connection {
  pub name:     String,
  #[serde(rename = "type")]
  pub kind:     EntityType,
  pub relation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewContact {
  pub id:             EntityId,
  pub name:           String,
  pub notes:          String,
  pub last_mentioned: DateTime<Utc>,
  pub days_stale:     i64,
  pub mention_count:  i64,
  pub strength:       f64,
  pub connections:    Vec<Connection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipReview {
  pub timestamp:      DateTime<Utc>,
  pub stale_contacts: Vec<ReviewContact>,
  pub count:          usize,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Read-only evaluator over a [`GraphStore`]. Every call reads one snapshot,
/// so all rules in that call see the same graph.
pub struct NudgeEngine<'a, S> {
  store:  &'a S,
  config: &'a NudgeConfig,
}

impl<'a, S: GraphStore> NudgeEngine<'a, S> {
  pub fn new(store: &'a S, config: &'a NudgeConfig) -> Self { Self { store, config } }

  /// Every rule, merged, ranked and capped; empty inside quiet hours.
  pub async fn check_all(&self) -> Result<NudgeReport, S::Error> {
    let snapshot = self.store.snapshot().await?;
    Ok(self.evaluate(&snapshot))
  }

  /// One rule, ranked but neither capped nor silenced by quiet hours.
  pub async fn check(&self, kind: NudgeKind) -> Result<RuleReport, S::Error> {
    let snapshot = self.store.snapshot().await?;
    let ctx = RuleContext::new(&snapshot, self.config);
    let nudges = rank(rules::rule(kind)(&ctx));
    tracing::debug!(rule = %kind, count = nudges.len(), "rule checked");
    Ok(RuleReport { count: nudges.len(), nudges })
  }

  /// Stats and the full nudge pass, both read from one snapshot.
  pub async fn morning_briefing(&self) -> Result<MorningBriefing, S::Error> {
    let snapshot = self.store.snapshot().await?;
    Ok(MorningBriefing {
      timestamp: snapshot.taken_at,
      stats:     GraphStats::from_snapshot(&snapshot),
      report:    self.evaluate(&snapshot),
    })
  }

  /// The top follow-up candidates with their one-hop connections.
  pub async fn relationship_review(&self) -> Result<RelationshipReview, S::Error> {
    let snapshot = self.store.snapshot().await?;
    let ctx = RuleContext::new(&snapshot, self.config);

    let stale_contacts: Vec<ReviewContact> = stale_contacts(&ctx)
      .into_iter()
      .take(REVIEW_SIZE)
      .map(|c| {
        let mut incident: Vec<_> = snapshot.incident(c.entity.id).collect();
        incident.sort_by(|a, b| b.strength.total_cmp(&a.strength).then(a.id.cmp(&b.id)));
        let connections = incident
          .into_iter()
          .filter_map(|r| {
            let other = snapshot.entity(r.other_end(c.entity.id)?)?;
            Some(Connection {
              name:     other.name.clone(),
              kind:     other.entity_type,
              relation: r.relation_type.clone(),
            })
          })
          .take(REVIEW_CONNECTIONS)
          .collect();

        ReviewContact {
          id: c.entity.id,
          name: c.entity.name.clone(),
          notes: c.entity.notes.clone(),
          last_mentioned: c.entity.last_mentioned,
          days_stale: c.days_stale,
          mention_count: c.entity.mention_count,
          strength: c.strength.unwrap_or(0.0),
          connections,
        }
      })
      .collect();

    Ok(RelationshipReview {
      timestamp: snapshot.taken_at,
      count: stale_contacts.len(),
      stale_contacts,
    })
  }

  fn evaluate(&self, snapshot: &GraphSnapshot) -> NudgeReport {
    let ctx = RuleContext::new(snapshot, self.config);

    let candidates: Vec<Nudge> = NudgeKind::iter()
      .flat_map(|kind| {
        let found = rules::rule(kind)(&ctx);
        tracing::debug!(rule = %kind, candidates = found.len(), "rule evaluated");
        found
      })
      .collect();

    let mut nudges = rank(candidates);
    let total = nudges.len();
    nudges.truncate(self.config.max_nudges_per_day);

    let quiet_hours = self.config.in_quiet_hours(ctx.now);
    if quiet_hours {
      nudges.clear();
    }

    tracing::info!(total, shown = nudges.len(), quiet_hours, "nudges evaluated");
    NudgeReport { shown: nudges.len(), nudges, total, quiet_hours }
  }
}
