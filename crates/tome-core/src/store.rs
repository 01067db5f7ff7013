//! The `VersionStore` trait and the revision types it commits.
//!
//! The trait is implemented by storage backends (e.g. `tome-store-sqlite`).
//! The versioning service and the HTTP layer depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  entity::{Entity, NewEntity},
  field::Fields,
  snapshot::{NewSnapshot, Snapshot},
};

// ─── Revision ────────────────────────────────────────────────────────────────

/// One atomic change to an entity: the "before" snapshot plus the new live
/// fields, guarded by the version the caller read.
#[derive(Debug, Clone)]
pub struct Revision {
  /// The entity version the new fields were derived from.
  pub base_version: u64,
  /// The complete live field set after the change.
  pub fields:       Fields,
  /// Snapshot of the pre-change content; its `entity_id` names the entity.
  pub snapshot:     NewSnapshot,
}

impl Revision {
  pub fn entity_id(&self) -> &str { &self.snapshot.entity_id }
}

/// Result of [`VersionStore::commit_revision`].
#[derive(Debug, Clone)]
pub enum CommitOutcome {
  /// Snapshot recorded and entity updated in one transaction.
  Committed { snapshot: Snapshot, entity: Entity },
  /// The idempotency key was already used for this entity. Nothing was
  /// written; `snapshot` is the one recorded by the first attempt.
  Replayed { snapshot: Snapshot, entity: Entity },
  /// The idempotency key was already used for this entity by a different
  /// request. Nothing was written.
  KeyReused { snapshot: Snapshot },
  /// The entity changed since `base_version` was read. Nothing was written.
  VersionMismatch { actual: u64 },
  /// The entity does not exist. Nothing was written.
  EntityMissing,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a versioned entity store backend.
///
/// Snapshots are append-only. The only write path for live entity content is
/// [`VersionStore::commit_revision`], which records the accompanying
/// snapshot in the same transaction.
///
/// `Self::Error` represents persistence failures only; domain outcomes such
/// as a version mismatch are part of the return value.
pub trait VersionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Entities ──────────────────────────────────────────────────────────

  /// Create and persist a new entity at version 0. Returns `None` if the id
  /// is already taken.
  fn create_entity(
    &self,
    input: NewEntity,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;

  /// Retrieve an entity by id. Returns `None` if not found.
  fn get_entity<'a>(
    &'a self,
    entity_id: &'a str,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + 'a;

  /// List all entities, ordered by id.
  fn list_entities(
    &self,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + '_;

  // ── Snapshots ─────────────────────────────────────────────────────────

  /// Record a snapshot without touching live state, as one atomic write.
  /// Id, sequence and timestamp are assigned by the store.
  fn record_snapshot(
    &self,
    input: NewSnapshot,
  ) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + '_;

  /// Retrieve a snapshot by id, regardless of its owner.
  fn get_snapshot(
    &self,
    snapshot_id: Uuid,
  ) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + '_;

  /// All snapshots for an entity, oldest first. Empty when there is no
  /// history or no such entity.
  fn list_snapshots<'a>(
    &'a self,
    entity_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + 'a;

  // ── Revisions ─────────────────────────────────────────────────────────

  /// Atomically record `revision.snapshot` and replace the live fields,
  /// provided the entity is still at `revision.base_version`.
  fn commit_revision(
    &self,
    revision: Revision,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + '_;
}
