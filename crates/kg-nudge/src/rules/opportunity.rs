//! Opportunity: a contact needs something you are good at.

use kg_core::entity::{Entity, EntityType};
use serde_json::Value;

use super::RuleContext;
use crate::nudge::{Nudge, NudgeContext, NudgeKind};

/// `metadata.needs` as a list, whether written as one string or several.
fn needs(person: &Entity) -> Vec<String> {
  match person.meta("needs") {
    Some(Value::String(s)) => vec![s.clone()],
    Some(Value::Array(items)) => items
      .iter()
      .filter_map(Value::as_str)
      .map(str::to_owned)
      .collect(),
    _ => Vec::new(),
  }
  .into_iter()
  .filter(|n| !n.trim().is_empty())
  .collect()
}

/// Lowercased words of `s`, space-padded so whole-word phrases can be found
/// with a substring search.
fn padded_words(s: &str) -> String {
  let words: Vec<String> = s
    .split(|c: char| !c.is_alphanumeric())
    .filter(|w| !w.is_empty())
    .map(str::to_lowercase)
    .collect();
  format!(" {} ", words.join(" "))
}

pub fn check(ctx: &RuleContext<'_>) -> Vec<Nudge> {
  let weight = ctx.config.weight(NudgeKind::Opportunity);

  ctx
    .snapshot
    .of_type(EntityType::Person)
    .filter(|p| !ctx.config.is_owner(&p.name))
    .filter_map(|person| {
      let needs = needs(person);
      let haystack = padded_words(&needs.join(" "));
      let matched: Vec<String> = ctx
        .config
        .expertise_keywords
        .iter()
        .filter(|k| haystack.contains(&padded_words(k)))
        .cloned()
        .collect();
      if matched.is_empty() {
        return None;
      }
      Some(Nudge {
        kind:        NudgeKind::Opportunity,
        priority:    weight,
        entity_id:   person.id,
        entity_name: person.name.clone(),
        message:     format!(
          "{} needs help with {}; that matches your {} expertise.",
          person.name,
          needs.join(", "),
          matched.join("/")
        ),
        detail:      person.notes.clone(),
        anchor_at:   person.last_mentioned,
        context:     NudgeContext::Opportunity { needs, matched_keywords: matched },
      })
    })
    .collect()
}
