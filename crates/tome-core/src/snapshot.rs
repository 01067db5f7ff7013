//! Snapshot types for the immutable history of an entity.
//!
//! A snapshot captures what an entity looked like immediately before a
//! committed change. Snapshots are never updated or deleted; ordering within
//! one entity is given by `sequence`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, field::Fields};

/// Longest accepted change description, in characters.
pub const MAX_CHANGE_DESCRIPTION_LEN: usize = 1_000;

// ─── Editor ──────────────────────────────────────────────────────────────────

/// The identity attributed to a change, supplied by an external
/// authentication collaborator and trusted as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Editor {
  pub user_id: String,
  pub email:   String,
}

impl Editor {
  pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
    Self { user_id: user_id.into(), email: email.into() }
  }

  pub fn validate(&self) -> Result<()> {
    if self.user_id.trim().is_empty() {
      return Err(Error::Validation("editor id must not be empty".to_owned()));
    }
    if self.email.trim().is_empty() {
      return Err(Error::Validation("editor email must not be empty".to_owned()));
    }
    Ok(())
  }
}

// ─── Origin ──────────────────────────────────────────────────────────────────

/// Which operation produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotOrigin {
  /// Recorded by an ordinary edit.
  #[default]
  Edit,
  /// Recorded immediately before restoring `target`.
  Restore { target: Uuid },
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// An immutable, attributed copy of an entity's fields at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub snapshot_id:        Uuid,
  pub entity_id:          String,
  /// 1-based position in the entity's history.
  pub sequence:           u64,
  pub change_description: String,
  pub editor:             Editor,
  /// Server-assigned; non-decreasing within one entity.
  pub recorded_at:        DateTime<Utc>,
  pub content:            Fields,
  pub origin:             SnapshotOrigin,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub idempotency_key:    Option<String>,
  /// SHA-256 of the request that first used `idempotency_key`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub request_digest:     Option<String>,
}

/// Input to [`crate::store::VersionStore::record_snapshot`].
///
/// Id, sequence and `recorded_at` are always assigned by the store.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
  pub entity_id:          String,
  pub change_description: String,
  pub editor:             Editor,
  pub content:            Fields,
  pub origin:             SnapshotOrigin,
  pub idempotency_key:    Option<String>,
  /// Compared against the first use of `idempotency_key` before replaying.
  pub request_digest:     Option<String>,
}

impl NewSnapshot {
  pub fn new(
    entity_id: impl Into<String>,
    change_description: impl Into<String>,
    editor: Editor,
    content: Fields,
  ) -> Self {
    Self {
      entity_id: entity_id.into(),
      change_description: change_description.into(),
      editor,
      content,
      origin: SnapshotOrigin::Edit,
      idempotency_key: None,
      request_digest: None,
    }
  }
}

/// The description recorded for the "before" snapshot of a restore.
pub fn restore_description(target: Uuid) -> String {
  format!("state before restore to snapshot {target}")
}

pub fn validate_change_description(description: &str) -> Result<()> {
  if description.trim().is_empty() {
    return Err(Error::Validation(
      "change description must not be empty".to_owned(),
    ));
  }
  let len = description.chars().count();
  if len > MAX_CHANGE_DESCRIPTION_LEN {
    return Err(Error::Validation(format!(
      "change description exceeds {MAX_CHANGE_DESCRIPTION_LEN} characters (got {len})"
    )));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn origin_serialises_with_kind_tag() {
    let target = Uuid::nil();
    let json = serde_json::to_value(SnapshotOrigin::Restore { target }).unwrap();
    assert_eq!(json["kind"], "restore");
    assert_eq!(json["target"], target.to_string());

    let edit = serde_json::to_value(SnapshotOrigin::Edit).unwrap();
    assert_eq!(edit, serde_json::json!({ "kind": "edit" }));
  }

  #[test]
  fn change_description_limits() {
    assert!(validate_change_description("renamed").is_ok());
    assert!(validate_change_description("   ").is_err());
    let long = "x".repeat(MAX_CHANGE_DESCRIPTION_LEN + 1);
    assert!(validate_change_description(&long).is_err());
  }

  #[test]
  fn blank_editor_rejected() {
    assert!(Editor::new("u1", "a@example.com").validate().is_ok());
    assert!(Editor::new("", "a@example.com").validate().is_err());
    assert!(Editor::new("u1", " ").validate().is_err());
  }
}
