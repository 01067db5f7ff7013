//! Entity: the mutable, uniquely identified object under version control.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, field::Fields};

/// Longest accepted entity id, in bytes.
pub const MAX_ENTITY_ID_LEN: usize = 128;

/// The live state of an entity.
///
/// `version` starts at 0 and increases by exactly one with every committed
/// mutation or restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  pub entity_id:  String,
  pub fields:     Fields,
  pub version:    u64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Input to [`crate::store::VersionStore::create_entity`].
///
/// Timestamps are always set by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEntity {
  /// Caller-chosen id such as `course-1`; a UUID is generated when absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entity_id: Option<String>,
  #[serde(default)]
  pub fields:    Fields,
}

impl NewEntity {
  pub fn new(entity_id: impl Into<String>, fields: Fields) -> Self {
    Self { entity_id: Some(entity_id.into()), fields }
  }
}

/// Entity ids are short, URL-safe slugs.
pub fn validate_entity_id(id: &str) -> Result<()> {
  if id.is_empty() || id.len() > MAX_ENTITY_ID_LEN {
    return Err(Error::Validation(format!(
      "entity id must be 1..={MAX_ENTITY_ID_LEN} bytes"
    )));
  }
  let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
  if !id.chars().all(allowed) {
    return Err(Error::Validation(format!(
      "entity id may only contain [A-Za-z0-9._-]: {id:?}"
    )));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slugs_are_valid_ids() {
    assert!(validate_entity_id("course-1").is_ok());
    assert!(validate_entity_id("fiqh_101.v2").is_ok());
  }

  #[test]
  fn unsafe_ids_rejected() {
    assert!(validate_entity_id("").is_err());
    assert!(validate_entity_id("a/b").is_err());
    assert!(validate_entity_id("has space").is_err());
    assert!(validate_entity_id(&"x".repeat(MAX_ENTITY_ID_LEN + 1)).is_err());
  }
}
