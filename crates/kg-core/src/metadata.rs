//! Open-ended metadata documents attached to entities and relations.
//!
//! Metadata is a JSON object whose meaning is set by convention per entity
//! type (a person's `important_dates.birthday`, an event's `start_date`).
//! Documents are depth-bounded, updates apply as a JSON Merge Patch
//! (RFC 7396), and only keys from a restricted alphabet may be used as
//! query filters.

use serde_json::{Map, Value};

use crate::{Error, Result};

pub type Metadata = Map<String, Value>;

/// Deepest nesting accepted in a metadata document (the root object is 1).
pub const MAX_DEPTH: usize = 8;

const RESERVED_FILTER_KEYS: &[&str] = &["constructor", "prototype"];

/// Check nesting depth and key sanity of a metadata document.
pub fn validate(doc: &Metadata) -> Result<()> {
  fn walk(value: &Value, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH && (value.is_object() || value.is_array()) {
      return Err(Error::validation(format!(
        "metadata nested deeper than {MAX_DEPTH} levels"
      )));
    }
    match value {
      Value::Object(map) => {
        for (k, v) in map {
          if k.is_empty() {
            return Err(Error::validation("metadata keys must be non-empty"));
          }
          walk(v, depth + 1)?;
        }
        Ok(())
      }
      Value::Array(items) => items.iter().try_for_each(|v| walk(v, depth + 1)),
      _ => Ok(()),
    }
  }

  for (k, v) in doc {
    if k.is_empty() {
      return Err(Error::validation("metadata keys must be non-empty"));
    }
    walk(v, 2)?;
  }
  Ok(())
}

/// Apply `patch` to `target` in place.
///
/// Objects merge recursively, `null` removes the key, any other value
/// replaces what was there. An empty patch leaves `target` unchanged.
pub fn merge_patch(target: &mut Metadata, patch: &Metadata) {
  for (key, value) in patch {
    match value {
      Value::Null => {
        target.remove(key);
      }
      Value::Object(inner) => {
        let slot = target
          .entry(key.clone())
          .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
          *slot = Value::Object(Map::new());
        }
        if let Value::Object(existing) = slot {
          merge_patch(existing, inner);
        }
      }
      other => {
        target.insert(key.clone(), other.clone());
      }
    }
  }
}

/// Strip `null` members from a document being stored for the first time,
/// so a create and a patch onto an empty document agree.
pub fn without_nulls(doc: &Metadata) -> Metadata {
  let mut out = Metadata::new();
  merge_patch(&mut out, doc);
  out
}

/// Whether `key` may be used in a metadata filter predicate.
///
/// Keys are dotted JSON paths over `[a-zA-Z0-9_.-]`; anything else, keys
/// beginning with `__`, and prototype-style names are refused.
pub fn is_filter_key(key: &str) -> bool {
  !key.is_empty()
    && key
      .bytes()
      .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
    && !key.starts_with("__")
    && !key.starts_with('.')
    && !key.ends_with('.')
    && !key.contains("..")
    && !RESERVED_FILTER_KEYS.contains(&key.to_ascii_lowercase().as_str())
}

/// Resolve a dotted path against a document.
pub fn lookup<'a>(doc: &'a Metadata, path: &str) -> Option<&'a Value> {
  let mut parts = path.split('.');
  let mut current = doc.get(parts.next()?)?;
  for part in parts {
    current = current.as_object()?.get(part)?;
  }
  Some(current)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn doc(v: Value) -> Metadata { v.as_object().cloned().unwrap() }

  #[test]
  fn merge_patch_is_recursive() {
    let mut target = doc(json!({
      "role": "editor",
      "important_dates": {"birthday": "03-26"}
    }));
    merge_patch(
      &mut target,
      &doc(json!({"important_dates": {"anniversary": "06-01"}, "city": "Atlanta"})),
    );
    assert_eq!(
      Value::Object(target),
      json!({
        "role": "editor",
        "city": "Atlanta",
        "important_dates": {"birthday": "03-26", "anniversary": "06-01"}
      })
    );
  }

  #[test]
  fn merge_patch_null_removes_and_empty_is_noop() {
    let mut target = doc(json!({"a": 1, "b": {"c": 2}}));
    merge_patch(&mut target, &Metadata::new());
    assert_eq!(Value::Object(target.clone()), json!({"a": 1, "b": {"c": 2}}));

    merge_patch(&mut target, &doc(json!({"a": null, "b": {"c": null}})));
    assert_eq!(Value::Object(target), json!({"b": {}}));
  }

  #[test]
  fn merge_patch_replaces_scalar_with_object() {
    let mut target = doc(json!({"location": "Boston"}));
    merge_patch(&mut target, &doc(json!({"location": {"city": "Boston"}})));
    assert_eq!(Value::Object(target), json!({"location": {"city": "Boston"}}));
  }

  #[test]
  fn validate_bounds_depth() {
    let mut deep = json!("leaf");
    for _ in 0..=MAX_DEPTH {
      deep = json!({ "k": deep });
    }
    assert!(validate(&doc(deep.clone())).is_err());

    let ok = deep["k"].clone();
    assert!(validate(&doc(ok)).is_ok());
  }

  #[test]
  fn filter_key_alphabet() {
    assert!(is_filter_key("status"));
    assert!(is_filter_key("important_dates.birthday"));
    assert!(is_filter_key("start-date"));
    assert!(!is_filter_key("a b"));
    assert!(!is_filter_key("x') OR 1=1 --"));
    assert!(!is_filter_key("$.status"));
    assert!(!is_filter_key("__proto__"));
    assert!(!is_filter_key("Constructor"));
    assert!(!is_filter_key("a..b"));
    assert!(!is_filter_key(""));
  }

  #[test]
  fn lookup_dotted_paths() {
    let d = doc(json!({"important_dates": {"birthday": "01-21"}, "status": "active"}));
    assert_eq!(lookup(&d, "status"), Some(&json!("active")));
    assert_eq!(lookup(&d, "important_dates.birthday"), Some(&json!("01-21")));
    assert_eq!(lookup(&d, "important_dates.missing"), None);
    assert_eq!(lookup(&d, "status.deeper"), None);
  }
}
