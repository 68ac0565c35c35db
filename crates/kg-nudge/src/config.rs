//! The nudge rules configuration (`nudge-rules.json`).
//!
//! Loading is all-or-nothing: a document that is missing a required key or
//! holds an out-of-range value is rejected with every problem listed, and no
//! rule ever runs on a partially defaulted configuration.

use std::{
  collections::{BTreeMap, HashMap},
  path::Path,
};

use chrono::{DateTime, Duration, NaiveDate, Timelike as _, Utc};
use kg_core::entity::{EntityType, check_unit_interval};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator as _;

use crate::{
  Error, Result,
  nudge::NudgeKind,
};

/// Keywords the Opportunity rule looks for when none are configured.
pub const DEFAULT_EXPERTISE_KEYWORDS: &[&str] = &[
  "marketing",
  "communications",
  "branding",
  "social media",
  "content",
  "storytelling",
  "fundraising",
  "design",
  "pr",
];

pub const DEFAULT_INSIGHT_WINDOW_DAYS: u32 = 30;

// ─── Quiet hours ─────────────────────────────────────────────────────────────

/// A daily window, in whole local hours, during which `check_all` stays
/// silent. `start > end` wraps past midnight; `start == end` is no window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
  pub start: u32,
  pub end:   u32,
}

impl QuietHours {
  pub fn contains(&self, hour: u32) -> bool {
    match self.start.cmp(&self.end) {
      std::cmp::Ordering::Less => (self.start..self.end).contains(&hour),
      std::cmp::Ordering::Greater => hour >= self.start || hour < self.end,
      std::cmp::Ordering::Equal => false,
    }
  }
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NudgeConfig {
  pub stale_thresholds_days:     BTreeMap<EntityType, u32>,
  /// Ascending, without duplicates.
  pub travel_alert_days:         Vec<u32>,
  pub birthday_alert_days:       u32,
  pub quiet_hours:               QuietHours,
  pub max_nudges_per_day:        usize,
  pub priority_weights:          BTreeMap<NudgeKind, f64>,
  pub min_strength_for_followup: f64,
  pub owner_name:                Option<String>,
  pub utc_offset_hours:          i32,
  pub expertise_keywords:        Vec<String>,
  pub insight_window_days:       u32,
}

/// The document as written, before validation.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
  stale_thresholds_days:     Option<HashMap<String, i64>>,
  travel_alert_days:         Option<Vec<i64>>,
  birthday_alert_days:       Option<i64>,
  quiet_hours:               Option<RawQuietHours>,
  max_nudges_per_day:        Option<i64>,
  priority_weights:          Option<HashMap<String, f64>>,
  min_strength_for_followup: Option<f64>,
  owner_name:                Option<String>,
  utc_offset_hours:          Option<i64>,
  expertise_keywords:        Option<Vec<String>>,
  insight_window_days:       Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawQuietHours {
  start: Option<i64>,
  end:   Option<i64>,
}

/// Accumulates validation problems so they can be reported together.
#[derive(Default)]
struct Problems(Vec<String>);

impl Problems {
  fn missing(&mut self, key: &str) { self.0.push(format!("missing required key `{key}`")); }

  fn push(&mut self, msg: impl Into<String>) { self.0.push(msg.into()); }

  /// Check `value` against `min..=max`, returning it narrowed on success.
  fn ranged(&mut self, key: &str, value: i64, min: i64, max: i64) -> Option<u32> {
    if (min..=max).contains(&value) {
      u32::try_from(value).ok()
    } else {
      self.push(format!("`{key}` must be within {min}..={max}, got {value}"));
      None
    }
  }
}

impl NudgeConfig {
  /// Read and validate a rules file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
      path: path.to_owned(),
      source,
    })?;
    let config = Self::from_json_str(&text)?;
    tracing::debug!(path = %path.display(), "nudge rules loaded");
    Ok(config)
  }

  pub fn from_json_str(text: &str) -> Result<Self> {
    let raw: RawConfig = serde_json::from_str(text)?;
    Self::from_raw(raw)
  }

  pub fn from_value(value: serde_json::Value) -> Result<Self> {
    let raw: RawConfig = serde_json::from_value(value)?;
    Self::from_raw(raw)
  }

  fn from_raw(raw: RawConfig) -> Result<Self> {
    let mut p = Problems::default();

    let mut stale_thresholds_days = BTreeMap::new();
    match raw.stale_thresholds_days {
      None => p.missing("stale_thresholds_days"),
      Some(map) => {
        let mut entries: Vec<_> = map.into_iter().collect();
        entries.sort();
        for (name, days) in entries {
          match EntityType::parse(&name) {
            Ok(t) => {
              let key = format!("stale_thresholds_days.{name}");
              if let Some(d) = p.ranged(&key, days, 1, 365) {
                stale_thresholds_days.insert(t, d);
              }
            }
            Err(_) => p.push(format!("`stale_thresholds_days` names unknown entity type {name:?}")),
          }
        }
        for required in [EntityType::Person, EntityType::Project] {
          if !stale_thresholds_days.contains_key(&required)
            && !p.0.iter().any(|m| m.contains(&format!("stale_thresholds_days.{required}")))
          {
            p.push(format!("`stale_thresholds_days` must include `{required}`"));
          }
        }
      }
    }

    let mut travel_alert_days = Vec::new();
    match raw.travel_alert_days {
      None => p.missing("travel_alert_days"),
      Some(days) if days.is_empty() => p.push("`travel_alert_days` must not be empty"),
      Some(days) => {
        for d in days {
          if let Some(d) = p.ranged("travel_alert_days[]", d, 1, 365) {
            travel_alert_days.push(d);
          }
        }
        travel_alert_days.sort_unstable();
        travel_alert_days.dedup();
      }
    }

    let birthday_alert_days = match raw.birthday_alert_days {
      None => {
        p.missing("birthday_alert_days");
        None
      }
      Some(d) => p.ranged("birthday_alert_days", d, 1, 90),
    };

    let quiet_hours = match raw.quiet_hours {
      None => {
        p.missing("quiet_hours");
        None
      }
      Some(RawQuietHours { start, end }) => {
        let start = match start {
          Some(h) => p.ranged("quiet_hours.start", h, 0, 23),
          None => {
            p.missing("quiet_hours.start");
            None
          }
        };
        let end = match end {
          Some(h) => p.ranged("quiet_hours.end", h, 0, 23),
          None => {
            p.missing("quiet_hours.end");
            None
          }
        };
        start.zip(end).map(|(start, end)| QuietHours { start, end })
      }
    };

    let max_nudges_per_day = match raw.max_nudges_per_day {
      None => {
        p.missing("max_nudges_per_day");
        None
      }
      Some(n) => p.ranged("max_nudges_per_day", n, 0, 100).map(|n| n as usize),
    };

    let mut priority_weights = BTreeMap::new();
    match raw.priority_weights {
      None => p.missing("priority_weights"),
      Some(map) => {
        let mut entries: Vec<_> = map.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, weight) in entries {
          match name.parse::<NudgeKind>() {
            Ok(kind) if weight.is_finite() && (0.0..=100.0).contains(&weight) => {
              priority_weights.insert(kind, weight);
            }
            Ok(_) => p.push(format!("`priority_weights.{name}` must be within 0..=100, got {weight}")),
            Err(_) => p.push(format!("`priority_weights` names unknown rule {name:?}")),
          }
        }
        for kind in NudgeKind::iter() {
          if !priority_weights.contains_key(&kind)
            && !p.0.iter().any(|m| m.contains(&format!("priority_weights.{kind}`")))
          {
            p.push(format!("`priority_weights` must include `{kind}`"));
          }
        }
      }
    }

    let min_strength_for_followup = match raw.min_strength_for_followup {
      None => {
        p.missing("min_strength_for_followup");
        None
      }
      Some(s) => match check_unit_interval("min_strength_for_followup", s) {
        Ok(()) => Some(s),
        Err(e) => {
          p.push(format!("`min_strength_for_followup`: {e}"));
          None
        }
      },
    };

    let owner_name = raw
      .owner_name
      .map(|n| n.trim().to_owned())
      .filter(|n| !n.is_empty());

    let utc_offset_hours = match raw.utc_offset_hours {
      None => 0,
      Some(h) if (-12..=14).contains(&h) => h as i32,
      Some(h) => {
        p.push(format!("`utc_offset_hours` must be within -12..=14, got {h}"));
        0
      }
    };

    let expertise_keywords = match raw.expertise_keywords {
      None => DEFAULT_EXPERTISE_KEYWORDS.iter().map(|k| (*k).to_owned()).collect(),
      Some(words) => {
        let words: Vec<String> = words
          .into_iter()
          .map(|w| w.trim().to_lowercase())
          .filter(|w| !w.is_empty())
          .collect();
        if words.is_empty() {
          p.push("`expertise_keywords` must contain at least one keyword");
        }
        words
      }
    };

    let insight_window_days = match raw.insight_window_days {
      None => Some(DEFAULT_INSIGHT_WINDOW_DAYS),
      Some(d) => p.ranged("insight_window_days", d, 1, 365),
    };

    if !p.0.is_empty() {
      return Err(Error::Invalid(p.0));
    }

    // Every `None` above recorded a problem, so these are all present.
    let (
      Some(birthday_alert_days),
      Some(quiet_hours),
      Some(max_nudges_per_day),
      Some(min_strength_for_followup),
      Some(insight_window_days),
    ) = (
      birthday_alert_days,
      quiet_hours,
      max_nudges_per_day,
      min_strength_for_followup,
      insight_window_days,
    )
    else {
      return Err(Error::Invalid(vec!["incomplete configuration".into()]));
    };

    Ok(Self {
      stale_thresholds_days,
      travel_alert_days,
      birthday_alert_days,
      quiet_hours,
      max_nudges_per_day,
      priority_weights,
      min_strength_for_followup,
      owner_name,
      utc_offset_hours,
      expertise_keywords,
      insight_window_days,
    })
  }

  // ── Accessors used by the rules ───────────────────────────────────────

  pub fn weight(&self, kind: NudgeKind) -> f64 {
    self
      .priority_weights
      .get(&kind)
      .copied()
      .unwrap_or_else(|| kind.default_weight())
  }

  pub fn stale_threshold(&self, entity_type: EntityType) -> Option<u32> {
    self.stale_thresholds_days.get(&entity_type).copied()
  }

  /// Whether `name` is the graph owner, who never gets nudged about.
  pub fn is_owner(&self, name: &str) -> bool {
    self
      .owner_name
      .as_deref()
      .is_some_and(|owner| owner.eq_ignore_ascii_case(name.trim()))
  }

  fn local(&self, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(i64::from(self.utc_offset_hours))
  }

  /// The calendar date at `now` in the configured offset.
  pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate { self.local(now).date_naive() }

  pub fn in_quiet_hours(&self, now: DateTime<Utc>) -> bool {
    self.quiet_hours.contains(self.local(now).hour())
  }
}
