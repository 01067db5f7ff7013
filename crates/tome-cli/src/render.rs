//! Plain-text rendering of API results for the terminal.

use std::fmt::Write as _;

use tome_core::{
  diff::FieldDiff,
  entity::Entity,
  field::Fields,
  snapshot::{Snapshot, SnapshotOrigin},
};

pub fn entity(e: &Entity) -> String {
  let mut out = format!(
    "{}  (version {}, updated {})\n",
    e.entity_id,
    e.version,
    e.updated_at.format("%Y-%m-%d %H:%M:%S")
  );
  out.push_str(&fields(&e.fields, "  "));
  out
}

pub fn entity_row(e: &Entity) -> String {
  format!("{:<32} v{:<4} {} field(s)", e.entity_id, e.version, e.fields.len())
}

pub fn fields(fields: &Fields, indent: &str) -> String {
  let width = fields.keys().map(String::len).max().unwrap_or(0);
  let mut out = String::new();
  for (name, value) in fields {
    let _ = writeln!(out, "{indent}{name:<width$} = {value}");
  }
  out
}

pub fn snapshot(s: &Snapshot) -> String {
  let origin = match s.origin {
    SnapshotOrigin::Edit => String::new(),
    SnapshotOrigin::Restore { target } => format!(" [restore → {target}]"),
  };
  let mut out = format!(
    "#{} {}  {} <{}>{}\n  {}\n  {}\n",
    s.sequence,
    s.recorded_at.format("%Y-%m-%d %H:%M:%S"),
    s.editor.user_id,
    s.editor.email,
    origin,
    s.snapshot_id,
    s.change_description,
  );
  out.push_str(&fields(&s.content, "    "));
  out
}

pub fn diff(diffs: &[FieldDiff]) -> String {
  if diffs.is_empty() {
    return "no changes\n".to_owned();
  }
  let mut out = String::new();
  for d in diffs {
    let _ = match d {
      FieldDiff::Added { field, value } => writeln!(out, "+ {field} = {value}"),
      FieldDiff::Removed { field, value } => writeln!(out, "- {field} = {value}"),
      FieldDiff::Changed { field, from, to } => {
        writeln!(out, "~ {field}: {from} → {to}")
      }
    };
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn diff_lines_are_marked() {
    let out = diff(&[
      FieldDiff::Added { field: "a".into(), value: true.into() },
      FieldDiff::Changed { field: "b".into(), from: 1.0.into(), to: 2.0.into() },
      FieldDiff::Removed { field: "c".into(), value: "x".into() },
    ]);
    assert_eq!(out, "+ a = true\n~ b: 1 → 2\n- c = \"x\"\n");
  }

  #[test]
  fn empty_diff() {
    assert_eq!(diff(&[]), "no changes\n");
  }

  #[test]
  fn fields_are_aligned() {
    let mut f = Fields::new();
    f.insert("id".into(), 1.0.into());
    f.insert("title".into(), "A".into());
    assert_eq!(fields(&f, ""), "id    = 1\ntitle = \"A\"\n");
  }
}
