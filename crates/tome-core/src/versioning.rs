//! [`Versioning`]: the edit, history and restore operations over a
//! [`VersionStore`].
//!
//! Every change to live entity content goes through
//! [`VersionStore::commit_revision`], so a change is never visible without
//! the snapshot of the state it replaced.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

use crate::{
  Error, Result,
  diff::{self, FieldDiff},
  entity::{Entity, NewEntity, validate_entity_id},
  field::{FieldChanges, apply_changes, validate_changes, validate_fields},
  snapshot::{
    Editor, NewSnapshot, Snapshot, SnapshotOrigin, restore_description,
    validate_change_description,
  },
  store::{CommitOutcome, Revision, VersionStore},
};

/// How many times an unguarded write re-reads the entity after losing a
/// compare-and-set race before giving up with [`Error::Conflict`].
pub const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Longest accepted idempotency key, in bytes.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

// ─── Requests ────────────────────────────────────────────────────────────────

/// An ordinary edit to an entity's live fields.
#[derive(Debug, Clone)]
pub struct Mutation {
  pub entity_id:          String,
  pub changes:            FieldChanges,
  pub editor:             Editor,
  pub change_description: String,
  /// When set, the edit fails with [`Error::Conflict`] unless the entity is
  /// still at this version. When unset, the last writer wins.
  pub expected_version:   Option<u64>,
  /// Retries carrying the same key for the same entity are applied once.
  pub idempotency_key:    Option<String>,
}

/// A request to bring an entity back to a snapshot's content.
#[derive(Debug, Clone)]
pub struct Restoration {
  pub entity_id:        String,
  pub snapshot_id:      Uuid,
  pub editor:           Editor,
  pub expected_version: Option<u64>,
}

// ─── History ─────────────────────────────────────────────────────────────────

/// Display order for [`Versioning::history`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOrder {
  /// Store order: ascending sequence.
  #[default]
  Oldest,
  Newest,
}

/// The live entity alongside its snapshot history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
  /// `None` when the entity does not exist, which is distinct from an empty history.
  pub entity:    Option<Entity>,
  pub snapshots: Vec<Snapshot>,
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// Versioned entity operations over any [`VersionStore`].
///
/// Cloning is cheap; the store is shared.
pub struct Versioning<S> {
  store: Arc<S>,
}

impl<S> Clone for Versioning<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: VersionStore> Versioning<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  // ── Entities ──────────────────────────────────────────────────────────

  /// Create an entity. No snapshot is recorded; history starts empty.
  pub async fn create(&self, input: NewEntity) -> Result<Entity> {
    if let Some(id) = &input.entity_id {
      validate_entity_id(id)?;
    }
    validate_fields(&input.fields)?;

    let requested = input.entity_id.clone();
    let entity = self
      .store
      .create_entity(input)
      .await
      .map_err(Error::persistence)?
      .ok_or_else(|| Error::EntityExists(requested.unwrap_or_default()))?;

    tracing::info!(entity_id = %entity.entity_id, "entity created");
    Ok(entity)
  }

  /// The live entity, or [`Error::EntityNotFound`].
  pub async fn get(&self, entity_id: &str) -> Result<Entity> {
    self
      .store
      .get_entity(entity_id)
      .await
      .map_err(Error::persistence)?
      .ok_or_else(|| Error::EntityNotFound(entity_id.to_owned()))
  }

  pub async fn list(&self) -> Result<Vec<Entity>> {
    self.store.list_entities().await.map_err(Error::persistence)
  }

  // ── History ───────────────────────────────────────────────────────────

  /// Fetch the live entity and its snapshots concurrently.
  pub async fn history(
    &self,
    entity_id: &str,
    order: HistoryOrder,
  ) -> Result<History> {
    let (entity, snapshots) = tokio::join!(
      self.store.get_entity(entity_id),
      self.store.list_snapshots(entity_id),
    );
    let entity = entity.map_err(Error::persistence)?;
    let mut snapshots = snapshots.map_err(Error::persistence)?;

    if order == HistoryOrder::Newest {
      snapshots.reverse();
    }

    Ok(History { entity, snapshots })
  }

  /// One snapshot of `entity_id`.
  pub async fn snapshot(
    &self,
    entity_id: &str,
    snapshot_id: Uuid,
  ) -> Result<Snapshot> {
    let snapshot = self
      .store
      .get_snapshot(snapshot_id)
      .await
      .map_err(Error::persistence)?
      .ok_or(Error::SnapshotNotFound(snapshot_id))?;

    if snapshot.entity_id != entity_id {
      return Err(Error::InvalidReference {
        snapshot_id,
        entity_id: entity_id.to_owned(),
        owner: snapshot.entity_id,
      });
    }
    Ok(snapshot)
  }

  // ── Mutate ────────────────────────────────────────────────────────────

  /// Apply `mutation` to the live entity, recording the pre-change content
  /// as a snapshot in the same transaction.
  pub async fn mutate(&self, mutation: Mutation) -> Result<Entity> {
    validate_changes(&mutation.changes)?;
    validate_change_description(&mutation.change_description)?;
    mutation.editor.validate()?;
    let digest = match &mutation.idempotency_key {
      Some(key) => {
        validate_idempotency_key(key)?;
        Some(request_digest(&mutation.changes, &mutation.change_description)?)
      }
      None => None,
    };

    let mut last_race = None;
    for attempt in 1..=MAX_COMMIT_ATTEMPTS {
      let current = self.get(&mutation.entity_id).await?;

      let revision = Revision {
        base_version: mutation.expected_version.unwrap_or(current.version),
        fields:       apply_changes(&current.fields, &mutation.changes),
        snapshot:     NewSnapshot {
          entity_id:          current.entity_id.clone(),
          change_description: mutation.change_description.clone(),
          editor:             mutation.editor.clone(),
          content:            current.fields,
          origin:             SnapshotOrigin::Edit,
          idempotency_key:    mutation.idempotency_key.clone(),
          request_digest:     digest.clone(),
        },
      };

      match self.commit(revision, mutation.expected_version, attempt).await? {
        Attempt::Done(entity) => return Ok(entity),
        Attempt::Raced { base, actual } => last_race = Some((base, actual)),
      }
    }

    Err(exhausted(&mutation.entity_id, last_race))
  }

  // ── Restore ───────────────────────────────────────────────────────────

  /// Overwrite the live entity with a snapshot's content, first recording
  /// the current content so the restore can itself be undone.
  ///
  /// Not idempotent: every successful call appends one snapshot.
  pub async fn restore(&self, restoration: Restoration) -> Result<Entity> {
    restoration.editor.validate()?;

    let mut last_race = None;
    for attempt in 1..=MAX_COMMIT_ATTEMPTS {
      let current = self.get(&restoration.entity_id).await?;
      let target = self
        .snapshot(&restoration.entity_id, restoration.snapshot_id)
        .await?;

      let revision = Revision {
        base_version: restoration.expected_version.unwrap_or(current.version),
        fields:       diff::overlay(&current.fields, &target.content),
        snapshot:     NewSnapshot {
          entity_id:          current.entity_id.clone(),
          change_description: restore_description(target.snapshot_id),
          editor:             restoration.editor.clone(),
          content:            current.fields,
          origin:             SnapshotOrigin::Restore {
            target: target.snapshot_id,
          },
          idempotency_key:    None,
          request_digest:     None,
        },
      };

      match self
        .commit(revision, restoration.expected_version, attempt)
        .await?
      {
        Attempt::Done(entity) => {
          tracing::info!(
            entity_id = %entity.entity_id,
            target = %restoration.snapshot_id,
            version = entity.version,
            "entity restored"
          );
          return Ok(entity);
        }
        Attempt::Raced { base, actual } => last_race = Some((base, actual)),
      }
    }

    Err(exhausted(&restoration.entity_id, last_race))
  }

  /// What [`Versioning::restore`] would change, without writing anything.
  pub async fn preview_restore(
    &self,
    entity_id: &str,
    snapshot_id: Uuid,
  ) -> Result<Vec<FieldDiff>> {
    let current = self.get(entity_id).await?;
    let target = self.snapshot(entity_id, snapshot_id).await?;
    let restored = diff::overlay(&current.fields, &target.content);
    Ok(diff::compare(&current.fields, &restored))
  }

  // ── Internals ─────────────────────────────────────────────────────────

  /// Commit one revision. A guarded write (`expected` set) that finds the
  /// entity moved fails with [`Error::Conflict`]; an unguarded one reports
  /// the race so the caller can re-read and retry.
  async fn commit(
    &self,
    revision: Revision,
    expected: Option<u64>,
    attempt: usize,
  ) -> Result<Attempt> {
    let entity_id = revision.entity_id().to_owned();
    let base_version = revision.base_version;

    let outcome = self
      .store
      .commit_revision(revision)
      .await
      .map_err(Error::persistence)?;

    match outcome {
      CommitOutcome::Committed { snapshot, entity } => {
        tracing::info!(
          entity_id = %entity.entity_id,
          snapshot_id = %snapshot.snapshot_id,
          sequence = snapshot.sequence,
          version = entity.version,
          editor = %snapshot.editor.email,
          "revision committed"
        );
        Ok(Attempt::Done(entity))
      }
      CommitOutcome::Replayed { snapshot, entity } => {
        tracing::debug!(
          entity_id = %entity.entity_id,
          snapshot_id = %snapshot.snapshot_id,
          "idempotency key already applied; nothing written"
        );
        Ok(Attempt::Done(entity))
      }
      CommitOutcome::KeyReused { snapshot } => {
        tracing::warn!(
          %entity_id,
          snapshot_id = %snapshot.snapshot_id,
          "idempotency key reused for a different change"
        );
        Err(Error::IdempotencyKeyReused {
          entity_id,
          key: snapshot.idempotency_key.unwrap_or_default(),
        })
      }
      CommitOutcome::EntityMissing => Err(Error::EntityNotFound(entity_id)),
      CommitOutcome::VersionMismatch { actual } => match expected {
        Some(expected) => Err(Error::Conflict { entity_id, expected, actual }),
        None => {
          tracing::debug!(
            %entity_id,
            base_version,
            actual,
            attempt,
            "lost compare-and-set race; retrying"
          );
          Ok(Attempt::Raced { base: base_version, actual })
        }
      },
    }
  }
}

enum Attempt {
  Done(Entity),
  Raced { base: u64, actual: u64 },
}

/// The error returned once every attempt of an unguarded write lost its
/// compare-and-set race.
fn exhausted(entity_id: &str, last_race: Option<(u64, u64)>) -> Error {
  let (expected, actual) = last_race.unwrap_or_default();
  tracing::warn!(
    %entity_id,
    attempts = MAX_COMMIT_ATTEMPTS,
    "giving up after repeated concurrent writes"
  );
  Error::Conflict { entity_id: entity_id.to_owned(), expected, actual }
}

/// Fingerprint of what an idempotent edit asks for. A retry must match the
/// first request's digest to be replayed.
fn request_digest(changes: &FieldChanges, description: &str) -> Result<String> {
  let body = serde_json::to_vec(&(changes, description))?;
  Ok(hex::encode(Sha256::digest(&body)))
}

fn validate_idempotency_key(key: &str) -> Result<()> {
  if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
    return Err(Error::Validation(format!(
      "idempotency key must be 1..={MAX_IDEMPOTENCY_KEY_LEN} bytes"
    )));
  }
  Ok(())
}
