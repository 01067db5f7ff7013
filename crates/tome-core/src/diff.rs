//! Field-level comparison between two versions of an entity's content.

use serde::{Deserialize, Serialize};

use crate::field::{FieldValue, Fields};

/// How one field differs between `before` and `after`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum FieldDiff {
  Added { field: String, value: FieldValue },
  Removed { field: String, value: FieldValue },
  Changed { field: String, from: FieldValue, to: FieldValue },
}

impl FieldDiff {
  pub fn field(&self) -> &str {
    match self {
      Self::Added { field, .. }
      | Self::Removed { field, .. }
      | Self::Changed { field, .. } => field,
    }
  }
}

/// Every field that differs between `before` and `after`, ordered by name.
pub fn compare(before: &Fields, after: &Fields) -> Vec<FieldDiff> {
  let mut diffs = Vec::new();

  for (field, old) in before {
    match after.get(field) {
      None => diffs.push(FieldDiff::Removed {
        field: field.clone(),
        value: old.clone(),
      }),
      Some(new) if new != old => diffs.push(FieldDiff::Changed {
        field: field.clone(),
        from:  old.clone(),
        to:    new.clone(),
      }),
      Some(_) => {}
    }
  }

  for (field, new) in after {
    if !before.contains_key(field) {
      diffs.push(FieldDiff::Added {
        field: field.clone(),
        value: new.clone(),
      });
    }
  }

  diffs.sort_by(|a, b| a.field().cmp(b.field()));
  diffs
}

/// Copy `content` onto `live` field-for-field. Fields of `live` that are
/// absent from `content` are left untouched.
pub fn overlay(live: &Fields, content: &Fields) -> Fields {
  let mut next = live.clone();
  for (field, value) in content {
    next.insert(field.clone(), value.clone());
  }
  next
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
  fn identical_content_has_no_diff() {
    let a = fields(&[("title", "A".into()), ("price", 10.0.into())]);
    assert!(compare(&a, &a.clone()).is_empty());
  }

  #[test]
  fn reports_each_kind_sorted_by_field() {
    let before = fields(&[("title", "A".into()), ("level", "basic".into())]);
    let after = fields(&[("title", "B".into()), ("published", true.into())]);

    let diffs = compare(&before, &after);

    assert_eq!(diffs, vec![
      FieldDiff::Removed { field: "level".into(), value: "basic".into() },
      FieldDiff::Added { field: "published".into(), value: true.into() },
      FieldDiff::Changed {
        field: "title".into(),
        from:  "A".into(),
        to:    "B".into(),
      },
    ]);
  }

  #[test]
  fn type_change_is_a_change() {
    let before = fields(&[("price", "free".into())]);
    let after = fields(&[("price", 0.0.into())]);
    assert!(matches!(compare(&before, &after)[0], FieldDiff::Changed { .. }));
  }

  #[test]
  fn overlay_keeps_fields_missing_from_content() {
    let live = fields(&[
      ("title", "B".into()),
      ("status", "published".into()),
      ("price", 20.0.into()),
    ]);
    let content = fields(&[("title", "A".into()), ("status", "draft".into())]);

    let next = overlay(&live, &content);

    assert_eq!(next, fields(&[
      ("title", "A".into()),
      ("status", "draft".into()),
      ("price", 20.0.into()),
    ]));
  }
}
