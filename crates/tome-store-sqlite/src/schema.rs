//! SQL schema for the Tome SQLite store.
//!
//! Executed once at connection startup. Migrations are gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Live entity state. Rewritten only together with a snapshot insert.
CREATE TABLE IF NOT EXISTS entities (
    entity_id   TEXT PRIMARY KEY,
    fields_json TEXT NOT NULL,      -- JSON object: field name -> scalar
    version     INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,      -- ISO 8601 UTC; server-assigned
    updated_at  TEXT NOT NULL
);

-- Snapshots are strictly append-only; the triggers below reject any
-- UPDATE or DELETE.
CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id        TEXT PRIMARY KEY,
    entity_id          TEXT NOT NULL REFERENCES entities(entity_id),
    sequence           INTEGER NOT NULL,
    change_description TEXT NOT NULL,
    editor_id          TEXT NOT NULL,
    editor_email       TEXT NOT NULL,
    recorded_at        TEXT NOT NULL,   -- ISO 8601 UTC; non-decreasing per entity
    content_json       TEXT NOT NULL,
    origin_json        TEXT NOT NULL DEFAULT '{\"kind\":\"edit\"}',
    idempotency_key    TEXT,
    request_digest     TEXT,            -- SHA-256 of the keyed request
    UNIQUE (entity_id, sequence),
    UNIQUE (entity_id, idempotency_key)
);

CREATE TRIGGER IF NOT EXISTS snapshots_no_update
BEFORE UPDATE ON snapshots
BEGIN
    SELECT RAISE(ABORT, 'snapshots are immutable');
END;

CREATE TRIGGER IF NOT EXISTS snapshots_no_delete
BEFORE DELETE ON snapshots
BEGIN
    SELECT RAISE(ABORT, 'snapshots are immutable');
END;

CREATE INDEX IF NOT EXISTS snapshots_entity_idx ON snapshots(entity_id, sequence);

PRAGMA user_version = 2;
";

/// Brings a version 1 database up to the current `snapshots` layout. Must run
/// before [`SCHEMA`], which stamps the new `user_version`.
pub const MIGRATE_V1: &str = "
ALTER TABLE snapshots ADD COLUMN request_digest TEXT;
";
