//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so they also sort correctly as text. Field maps and
//! snapshot origins are stored as compact JSON. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use tome_core::{
  entity::Entity,
  field::Fields,
  snapshot::{Editor, Snapshot, SnapshotOrigin},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Integers ────────────────────────────────────────────────────────────────

/// SQLite integers are signed; versions and sequences never go negative.
pub fn encode_u64(n: u64) -> Result<i64> {
  i64::try_from(n).map_err(|_| Error::Corrupt(format!("{n} exceeds i64")))
}

pub fn decode_u64(n: i64) -> Result<u64> {
  u64::try_from(n).map_err(|_| Error::Corrupt(format!("negative counter {n}")))
}

// ─── Fields / origin ─────────────────────────────────────────────────────────

pub fn encode_fields(fields: &Fields) -> Result<String> {
  Ok(serde_json::to_string(fields)?)
}

pub fn decode_fields(s: &str) -> Result<Fields> { Ok(serde_json::from_str(s)?) }

pub fn encode_origin(origin: &SnapshotOrigin) -> Result<String> {
  Ok(serde_json::to_string(origin)?)
}

pub fn decode_origin(s: &str) -> Result<SnapshotOrigin> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const ENTITY_COLUMNS: &str =
  "entity_id, fields_json, version, created_at, updated_at";

/// Raw values read directly from an `entities` row.
#[derive(Debug)]
pub struct RawEntity {
  pub entity_id:   String,
  pub fields_json: String,
  pub version:     i64,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawEntity {
  /// Map a row selected with [`ENTITY_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:   row.get(0)?,
      fields_json: row.get(1)?,
      version:     row.get(2)?,
      created_at:  row.get(3)?,
      updated_at:  row.get(4)?,
    })
  }

  pub fn into_entity(self) -> Result<Entity> {
    Ok(Entity {
      entity_id:  self.entity_id,
      fields:     decode_fields(&self.fields_json)?,
      version:    decode_u64(self.version)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const SNAPSHOT_COLUMNS: &str = "snapshot_id, entity_id, sequence, \
   change_description, editor_id, editor_email, recorded_at, content_json, \
   origin_json, idempotency_key, request_digest";

/// Raw values read directly from a `snapshots` row.
#[derive(Debug)]
pub struct RawSnapshot {
  pub snapshot_id:        String,
  pub entity_id:          String,
  pub sequence:           i64,
  pub change_description: String,
  pub editor_id:          String,
  pub editor_email:       String,
  pub recorded_at:        String,
  pub content_json:       String,
  pub origin_json:        String,
  pub idempotency_key:    Option<String>,
  pub request_digest:     Option<String>,
}

impl RawSnapshot {
  /// Map a row selected with [`SNAPSHOT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id:        row.get(0)?,
      entity_id:          row.get(1)?,
      sequence:           row.get(2)?,
      change_description: row.get(3)?,
      editor_id:          row.get(4)?,
      editor_email:       row.get(5)?,
      recorded_at:        row.get(6)?,
      content_json:       row.get(7)?,
      origin_json:        row.get(8)?,
      idempotency_key:    row.get(9)?,
      request_digest:     row.get(10)?,
    })
  }

  pub fn into_snapshot(self) -> Result<Snapshot> {
    Ok(Snapshot {
      snapshot_id:        decode_uuid(&self.snapshot_id)?,
      entity_id:          self.entity_id,
      sequence:           decode_u64(self.sequence)?,
      change_description: self.change_description,
      editor:             Editor {
        user_id: self.editor_id,
        email:   self.editor_email,
      },
      recorded_at:        decode_dt(&self.recorded_at)?,
      content:            decode_fields(&self.content_json)?,
      origin:             decode_origin(&self.origin_json)?,
      idempotency_key:    self.idempotency_key,
      request_digest:     self.request_digest,
    })
  }
}
