//! Error types for `tome-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("entity not found: {0}")]
  EntityNotFound(String),

  #[error("entity already exists: {0}")]
  EntityExists(String),

  #[error("snapshot not found: {0}")]
  SnapshotNotFound(Uuid),

  /// The snapshot exists but belongs to a different entity.
  #[error("snapshot {snapshot_id} belongs to entity {owner:?}, not {entity_id:?}")]
  InvalidReference {
    snapshot_id: Uuid,
    entity_id:   String,
    owner:       String,
  },

  #[error("version conflict on {entity_id:?}: expected {expected}, found {actual}")]
  Conflict {
    entity_id: String,
    expected:  u64,
    actual:    u64,
  },

  /// An idempotency key was reused for a request with different content.
  #[error("idempotency key {key:?} was already used on {entity_id:?} for a different change")]
  IdempotencyKeyReused {
    entity_id: String,
    key:       String,
  },

  #[error("invalid input: {0}")]
  Validation(String),

  /// The backing store was unreachable or rejected the write. Transient; the
  /// whole operation may be retried.
  #[error("persistence error: {0}")]
  Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn persistence<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Persistence(Box::new(err))
  }

  /// Whether retrying the whole operation could succeed.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Persistence(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
