//! Birthday: upcoming `important_dates.birthday` of people.

use chrono::{Datelike as _, NaiveDate};
use kg_core::entity::EntityType;

use super::{RuleContext, anchor};
use crate::nudge::{Nudge, NudgeContext, NudgeKind, plural};

/// Read `MM-DD` or `YYYY-MM-DD` as a month and day.
fn parse_birthday(s: &str) -> Option<(u32, u32)> {
  let parts: Vec<&str> = s.trim().split('-').collect();
  let (month, day) = match parts.as_slice() {
    [m, d] => (m, d),
    [y, m, d] if y.len() == 4 => (m, d),
    _ => return None,
  };
  let month: u32 = month.parse().ok()?;
  let day: u32 = day.parse().ok()?;
  // 2024 is a leap year, so this admits Feb 29 and rejects Feb 30.
  NaiveDate::from_ymd_opt(2024, month, day).map(|_| (month, day))
}

/// The birthday as it falls in `year`; Feb 29 moves to Feb 28 off leap years.
fn in_year(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
  NaiveDate::from_ymd_opt(year, month, day).or_else(|| {
    (month == 2 && day == 29)
      .then(|| NaiveDate::from_ymd_opt(year, 2, 28))
      .flatten()
  })
}

/// The next occurrence on or after `today`.
fn next_occurrence(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
  let this_year = in_year(today.year(), month, day)?;
  if this_year >= today {
    Some(this_year)
  } else {
    in_year(today.year() + 1, month, day)
  }
}

pub fn check(ctx: &RuleContext<'_>) -> Vec<Nudge> {
  let weight = ctx.config.weight(NudgeKind::Birthday);
  let window = i64::from(ctx.config.birthday_alert_days);
  let today = ctx.today();

  ctx
    .snapshot
    .of_type(EntityType::Person)
    .filter_map(|person| {
      let raw = person.meta_str("important_dates.birthday")?;
      let (month, day) = parse_birthday(raw)?;
      let date = next_occurrence(today, month, day)?;
      let days_until = (date - today).num_days();
      if days_until > window {
        return None;
      }
      let when = match days_until {
        0 => "today".to_owned(),
        n => format!("in {}", plural(n, "day")),
      };
      Some(Nudge {
        kind:        NudgeKind::Birthday,
        priority:    weight,
        entity_id:   person.id,
        entity_name: person.name.clone(),
        message:     format!("{}'s birthday is {when}!", person.name),
        detail:      person.notes.clone(),
        anchor_at:   anchor(date),
        context:     NudgeContext::Birthday { days_until, date },
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

  fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  #[test]
  fn parses_both_formats_and_rejects_nonsense() {
    assert_eq!(parse_birthday("03-26"), Some((3, 26)));
    assert_eq!(parse_birthday("1990-01-21"), Some((1, 21)));
    assert_eq!(parse_birthday("02-29"), Some((2, 29)));
    assert_eq!(parse_birthday("02-30"), None);
    assert_eq!(parse_birthday("March 3"), None);
  }

  #[test]
  fn next_occurrence_wraps_and_handles_leap_day() {
    assert_eq!(next_occurrence(date(2026, 3, 1), 3, 5), Some(date(2026, 3, 5)));
    assert_eq!(next_occurrence(date(2026, 3, 1), 3, 1), Some(date(2026, 3, 1)));
    assert_eq!(next_occurrence(date(2026, 12, 30), 1, 2), Some(date(2027, 1, 2)));
    assert_eq!(next_occurrence(date(2026, 2, 1), 2, 29), Some(date(2026, 2, 28)));
    assert_eq!(next_occurrence(date(2028, 2, 1), 2, 29), Some(date(2028, 2, 29)));
  }

  #[test]
  fn fires_within_window_only() {
    // Fixture "now" is 2026-03-01; the window is 7 days.
    let mut g = Graph::default();
    g.entity("Ada", Person, 0, json!({"important_dates": {"birthday": "03-05"}}));
    g.entity("Bea", Person, 0, json!({"important_dates": {"birthday": "1985-03-01"}}));
    g.entity("Cy", Person, 0, json!({"important_dates": {"birthday": "03-20"}}));
    g.entity("Dee", Person, 0, json!({"important_dates": {"birthday": "02-27"}}));
    g.entity("Acme", Org, 0, json!({"important_dates": {"birthday": "03-02"}}));
    let snap = g.snapshot();
    let config = config();

    let nudges = check(&RuleContext::new(&snap, &config));
    let names: Vec<_> = nudges.iter().map(|n| n.entity_name.as_str()).collect();
    assert_eq!(names, ["Ada", "Bea"]);
    assert_eq!(nudges[0].message, "Ada's birthday is in 4 days!");
    assert_eq!(nudges[1].message, "Bea's birthday is today!");
  }
}
