//! Field values: the typed content of entities and snapshots.
//!
//! An entity is an open set of named scalar fields. Each value carries its
//! type; a field that is absent is simply not present in the map.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest accepted field name, in bytes.
pub const MAX_FIELD_NAME_LEN: usize = 128;

// ─── FieldValue ──────────────────────────────────────────────────────────────

/// A single scalar field value.
///
/// On the wire this is a plain JSON scalar (`true`, `12.5`, `"draft"`); the
/// variant is recovered from the JSON type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
  Bool(bool),
  Number(f64),
  Text(String),
}

impl FieldValue {
  /// The type name used in error messages and diffs.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Bool(_) => "bool",
      Self::Number(_) => "number",
      Self::Text(_) => "text",
    }
  }
}

impl fmt::Display for FieldValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Bool(b) => write!(f, "{b}"),
      Self::Number(n) => write!(f, "{n}"),
      Self::Text(s) => write!(f, "{s:?}"),
    }
  }
}

impl From<bool> for FieldValue {
  fn from(b: bool) -> Self { Self::Bool(b) }
}

impl From<f64> for FieldValue {
  fn from(n: f64) -> Self { Self::Number(n) }
}

impl From<&str> for FieldValue {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for FieldValue {
  fn from(s: String) -> Self { Self::Text(s) }
}

// ─── Maps ────────────────────────────────────────────────────────────────────

/// The full (or, for snapshots, partial) field content of an entity.
pub type Fields = BTreeMap<String, FieldValue>;

/// A set of edits: `Some` sets a field, `None` removes it.
pub type FieldChanges = BTreeMap<String, Option<FieldValue>>;

/// Apply `changes` on top of `fields`, returning the new content.
pub fn apply_changes(fields: &Fields, changes: &FieldChanges) -> Fields {
  let mut next = fields.clone();
  for (name, change) in changes {
    match change {
      Some(value) => {
        next.insert(name.clone(), value.clone());
      }
      None => {
        next.remove(name);
      }
    }
  }
  next
}

// ─── Validation ──────────────────────────────────────────────────────────────

pub fn validate_field_name(name: &str) -> Result<()> {
  if name.is_empty() {
    return Err(Error::Validation("field name must not be empty".to_owned()));
  }
  if name.len() > MAX_FIELD_NAME_LEN {
    return Err(Error::Validation(format!(
      "field name exceeds {MAX_FIELD_NAME_LEN} bytes: {name:?}"
    )));
  }
  if name.chars().any(char::is_control) {
    return Err(Error::Validation(format!(
      "field name contains control characters: {name:?}"
    )));
  }
  Ok(())
}

pub fn validate_value(name: &str, value: &FieldValue) -> Result<()> {
  if let FieldValue::Number(n) = value
    && !n.is_finite()
  {
    return Err(Error::Validation(format!(
      "field {name:?} must be a finite number"
    )));
  }
  Ok(())
}

/// Validate every name and value in a full field map.
pub fn validate_fields(fields: &Fields) -> Result<()> {
  for (name, value) in fields {
    validate_field_name(name)?;
    validate_value(name, value)?;
  }
  Ok(())
}

/// Validate a change set. An empty change set is rejected: every accepted
/// mutation must describe at least one field.
pub fn validate_changes(changes: &FieldChanges) -> Result<()> {
  if changes.is_empty() {
    return Err(Error::Validation("no field changes supplied".to_owned()));
  }
  for (name, change) in changes {
    validate_field_name(name)?;
    if let Some(value) = change {
      validate_value(name, value)?;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fields(pairs: &[(&str, FieldValue)]) -> Fields {
    pairs
      .iter()
      .map(|(k, v)| ((*k).to_owned(), v.clone()))
      .collect()
  }

  #[test]
  fn json_scalars_map_to_variants() {
    let parsed: Fields = serde_json::from_str(
      r#"{"title":"Intro","price":49.5,"published":false}"#,
    )
    .unwrap();
    assert_eq!(parsed["title"], FieldValue::Text("Intro".into()));
    assert_eq!(parsed["price"], FieldValue::Number(49.5));
    assert_eq!(parsed["published"], FieldValue::Bool(false));
  }

  #[test]
  fn null_in_changes_means_remove() {
    let changes: FieldChanges =
      serde_json::from_str(r#"{"title":"B","instructor":null}"#).unwrap();
    let before = fields(&[
      ("title", "A".into()),
      ("instructor", "Sara".into()),
      ("status", "draft".into()),
    ]);

    let after = apply_changes(&before, &changes);

    assert_eq!(after, fields(&[("title", "B".into()), ("status", "draft".into())]));
  }

  #[test]
  fn empty_changes_rejected() {
    let err = validate_changes(&FieldChanges::new()).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[test]
  fn non_finite_numbers_rejected() {
    let mut changes = FieldChanges::new();
    changes.insert("price".into(), Some(FieldValue::Number(f64::NAN)));
    assert!(matches!(validate_changes(&changes), Err(Error::Validation(_))));
  }

  #[test]
  fn bad_field_names_rejected() {
    assert!(validate_field_name("").is_err());
    assert!(validate_field_name("bad\nname").is_err());
    assert!(validate_field_name(&"x".repeat(MAX_FIELD_NAME_LEN + 1)).is_err());
    assert!(validate_field_name("title").is_ok());
  }
}
