//! [`SqliteStore`]: the SQLite implementation of [`VersionStore`].

use std::path::Path;

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use tome_core::{
  entity::{Entity, NewEntity},
  snapshot::{NewSnapshot, Snapshot},
  store::{CommitOutcome, Revision, VersionStore},
};

use crate::{
  Error, Result,
  encode::{
    ENTITY_COLUMNS, RawEntity, RawSnapshot, SNAPSHOT_COLUMNS, decode_dt,
    decode_u64, encode_dt, encode_fields, encode_origin, encode_u64, encode_uuid,
  },
  schema::{MIGRATE_V1, SCHEMA},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tome store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Raw connection access for tests that poke at the schema directly.
  #[cfg(test)]
  pub(crate) fn conn_for_tests(&self) -> &tokio_rusqlite::Connection {
    &self.conn
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        let version: i64 =
          conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        if version == 1 {
          conn.execute_batch(MIGRATE_V1)?;
        }
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Snapshot positioning ────────────────────────────────────────────────────

/// What a snapshot insert needs once its position has been assigned.
pub(crate) struct SnapshotRow {
  snapshot_id:        String,
  entity_id:          String,
  change_description: String,
  editor_id:          String,
  editor_email:       String,
  content_json:       String,
  origin_json:        String,
  idempotency_key:    Option<String>,
  request_digest:     Option<String>,
}

impl SnapshotRow {
  pub(crate) fn encode(input: &NewSnapshot, snapshot_id: Uuid) -> Result<Self> {
    Ok(Self {
      snapshot_id:        encode_uuid(snapshot_id),
      entity_id:          input.entity_id.clone(),
      change_description: input.change_description.clone(),
      editor_id:          input.editor.user_id.clone(),
      editor_email:       input.editor.email.clone(),
      content_json:       encode_fields(&input.content)?,
      origin_json:        encode_origin(&input.origin)?,
      idempotency_key:    input.idempotency_key.clone(),
      request_digest:     input.request_digest.clone(),
    })
  }

  /// Insert at the next sequence for the entity. Returns the assigned
  /// `(sequence, recorded_at)`.
  ///
  /// `recorded_at` is clamped to the previous snapshot's timestamp so it never
  /// decreases within one entity, even if the wall clock steps backwards.
  pub(crate) fn insert(
    &self,
    conn: &rusqlite::Connection,
    now: DateTime<Utc>,
  ) -> tokio_rusqlite::Result<(i64, String)> {
    let previous: Option<(i64, String)> = conn
      .query_row(
        "SELECT sequence, recorded_at FROM snapshots
         WHERE entity_id = ?1
         ORDER BY sequence DESC
         LIMIT 1",
        rusqlite::params![self.entity_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
      )
      .optional()?;

    let (sequence, recorded_at) = match previous {
      None => (1, now),
      Some((seq, at)) => {
        let at = decode_dt(&at)
          .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
        (seq + 1, at.max(now))
      }
    };
    let recorded_at = encode_dt(recorded_at);

    conn.execute(
      "INSERT INTO snapshots (
         snapshot_id, entity_id, sequence, change_description,
         editor_id, editor_email, recorded_at, content_json,
         origin_json, idempotency_key, request_digest
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
      rusqlite::params![
        self.snapshot_id,
        self.entity_id,
        sequence,
        self.change_description,
        self.editor_id,
        self.editor_email,
        recorded_at,
        self.content_json,
        self.origin_json,
        self.idempotency_key,
        self.request_digest,
      ],
    )?;

    Ok((sequence, recorded_at))
  }
}

/// Rows read back inside a commit transaction, decoded afterwards.
enum RawCommit {
  Committed {
    entity:   RawEntity,
    snapshot: RawSnapshot,
  },
  Replayed {
    entity:   RawEntity,
    snapshot: RawSnapshot,
  },
  KeyReused(RawSnapshot),
  VersionMismatch(i64),
  EntityMissing,
}

fn select_entity(
  conn: &rusqlite::Connection,
  entity_id: &str,
) -> rusqlite::Result<Option<RawEntity>> {
  conn
    .query_row(
      &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_id = ?1"),
      rusqlite::params![entity_id],
      RawEntity::from_row,
    )
    .optional()
}

fn select_snapshot(
  conn: &rusqlite::Connection,
  snapshot_id: &str,
) -> rusqlite::Result<Option<RawSnapshot>> {
  conn
    .query_row(
      &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE snapshot_id = ?1"),
      rusqlite::params![snapshot_id],
      RawSnapshot::from_row,
    )
    .optional()
}

// ─── VersionStore impl ───────────────────────────────────────────────────────

impl VersionStore for SqliteStore {
  type Error = Error;

  // ── Entities ──────────────────────────────────────────────────────────────

  async fn create_entity(&self, input: NewEntity) -> Result<Option<Entity>> {
    let entity_id  = input.entity_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    // Stored timestamps carry microseconds; match them in the returned value.
    let now        = Utc::now().trunc_subsecs(6);
    let entity     = Entity {
      entity_id,
      fields: input.fields,
      version: 0,
      created_at: now,
      updated_at: now,
    };

    let id_str     = entity.entity_id.clone();
    let fields_str = encode_fields(&entity.fields)?;
    let at_str     = encode_dt(now);

    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO entities
             (entity_id, fields_json, version, created_at, updated_at)
           VALUES (?1, ?2, 0, ?3, ?3)",
          rusqlite::params![id_str, fields_str, at_str],
        )?;
        Ok(n == 1)
      })
      .await?;

    Ok(inserted.then_some(entity))
  }

  async fn get_entity<'a>(&'a self, entity_id: &'a str) -> Result<Option<Entity>> {
    let id_str = entity_id.to_owned();

    let raw = self
      .conn
      .call(move |conn| Ok(select_entity(conn, &id_str)?))
      .await?;

    raw.map(RawEntity::into_entity).transpose()
  }

  async fn list_entities(&self) -> Result<Vec<Entity>> {
    let raws: Vec<RawEntity> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENTITY_COLUMNS} FROM entities ORDER BY entity_id"
        ))?;
        let rows = stmt
          .query_map([], RawEntity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  // ── Snapshots ─────────────────────────────────────────────────────────────

  async fn record_snapshot(&self, input: NewSnapshot) -> Result<Snapshot> {
    let snapshot_id = Uuid::new_v4();
    let row         = SnapshotRow::encode(&input, snapshot_id)?;
    let now         = Utc::now();

    let assigned: Option<(i64, String)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if select_entity(&tx, &row.entity_id)?.is_none() {
          return Ok(None);
        }
        let position = row.insert(&tx, now)?;
        tx.commit()?;
        Ok(Some(position))
      })
      .await?;

    let Some((sequence, recorded_at)) = assigned else {
      return Err(Error::EntityNotFound(input.entity_id));
    };

    Ok(Snapshot {
      snapshot_id,
      entity_id: input.entity_id,
      sequence: decode_u64(sequence)?,
      change_description: input.change_description,
      editor: input.editor,
      recorded_at: decode_dt(&recorded_at)?,
      content: input.content,
      origin: input.origin,
      idempotency_key: input.idempotency_key,
      request_digest: input.request_digest,
    })
  }

  async fn get_snapshot(&self, snapshot_id: Uuid) -> Result<Option<Snapshot>> {
    let id_str = encode_uuid(snapshot_id);

    let raw = self
      .conn
      .call(move |conn| Ok(select_snapshot(conn, &id_str)?))
      .await?;

    raw.map(RawSnapshot::into_snapshot).transpose()
  }

  async fn list_snapshots<'a>(&'a self, entity_id: &'a str) -> Result<Vec<Snapshot>> {
    let id_str = entity_id.to_owned();

    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
           WHERE entity_id = ?1
           ORDER BY sequence ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawSnapshot::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  // ── Revisions ─────────────────────────────────────────────────────────────

  async fn commit_revision(&self, revision: Revision) -> Result<CommitOutcome> {
    let snapshot_id  = Uuid::new_v4();
    let row          = SnapshotRow::encode(&revision.snapshot, snapshot_id)?;
    let fields_str   = encode_fields(&revision.fields)?;
    let base_version = encode_u64(revision.base_version)?;
    let now          = Utc::now();

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if let Some(key) = &row.idempotency_key {
          let prior = tx
            .query_row(
              &format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                 WHERE entity_id = ?1 AND idempotency_key = ?2"
              ),
              rusqlite::params![row.entity_id, key],
              RawSnapshot::from_row,
            )
            .optional()?;
          if let Some(snapshot) = prior {
            if snapshot.request_digest != row.request_digest {
              return Ok(RawCommit::KeyReused(snapshot));
            }
            if let Some(entity) = select_entity(&tx, &row.entity_id)? {
              return Ok(RawCommit::Replayed { entity, snapshot });
            }
          }
        }

        let version: Option<i64> = tx
          .query_row(
            "SELECT version FROM entities WHERE entity_id = ?1",
            rusqlite::params![row.entity_id],
            |r| r.get(0),
          )
          .optional()?;
        let Some(version) = version else {
          return Ok(RawCommit::EntityMissing);
        };
        if version != base_version {
          return Ok(RawCommit::VersionMismatch(version));
        }

        let (_, recorded_at) = row.insert(&tx, now)?;
        tx.execute(
          "UPDATE entities
           SET fields_json = ?2, version = version + 1, updated_at = ?3
           WHERE entity_id = ?1 AND version = ?4",
          rusqlite::params![row.entity_id, fields_str, recorded_at, base_version],
        )?;

        let snapshot = select_snapshot(&tx, &row.snapshot_id)?;
        let entity = select_entity(&tx, &row.entity_id)?;
        tx.commit()?;

        match (snapshot, entity) {
          (Some(snapshot), Some(entity)) => Ok(RawCommit::Committed { entity, snapshot }),
          _ => Err(tokio_rusqlite::Error::Other(
            "committed rows vanished inside the transaction".into(),
          )),
        }
      })
      .await?;

    match raw {
      RawCommit::Committed { entity, snapshot } => {
        tracing::trace!(snapshot_id = %snapshot_id, "snapshot and entity written");
        Ok(CommitOutcome::Committed {
          snapshot: snapshot.into_snapshot()?,
          entity:   entity.into_entity()?,
        })
      }
      RawCommit::Replayed { entity, snapshot } => Ok(CommitOutcome::Replayed {
        snapshot: snapshot.into_snapshot()?,
        entity:   entity.into_entity()?,
      }),
      RawCommit::KeyReused(snapshot) => Ok(CommitOutcome::KeyReused {
        snapshot: snapshot.into_snapshot()?,
      }),
      RawCommit::VersionMismatch(actual) => Ok(CommitOutcome::VersionMismatch {
        actual: decode_u64(actual)?,
      }),
      RawCommit::EntityMissing => Ok(CommitOutcome::EntityMissing),
    }
  }
}
