//! Handlers for an entity's history and snapshots.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entities/:id/history` | Optional `?order=oldest\|newest` |
//! | `GET`  | `/entities/:id/snapshots/:sid` | One snapshot |
//! | `GET`  | `/entities/:id/snapshots/:sid/diff` | What a restore would change |
//! | `POST` | `/entities/:id/snapshots/:sid/restore` | Body (optional): `{"expected_version":3}` |

use axum::{
  Json,
  body::Bytes,
  extract::{Path, Query, State},
  http::{HeaderMap, header},
  response::IntoResponse,
};
use serde::Deserialize;
use tome_core::{
  Versioning,
  diff::FieldDiff,
  snapshot::Snapshot,
  store::VersionStore,
  versioning::{History, HistoryOrder, Restoration},
};
use uuid::Uuid;

use crate::{
  editor::RequireEditor,
  error::ApiError,
  etag::{self, entity_etag},
  expected_version, guard_version,
};

// ─── History ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  #[serde(default)]
  pub order: HistoryOrder,
}

/// `GET /entities/:id/history[?order=newest]`
///
/// 404 when the entity does not exist; an existing entity that was never
/// edited returns an empty `snapshots` list.
pub async fn history<S>(
  State(service): State<Versioning<S>>,
  Path(id): Path<String>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<History>, ApiError>
where
  S: VersionStore,
{
  let history = service.history(&id, params.order).await?;
  if history.entity.is_none() {
    return Err(ApiError::NotFound(format!("entity not found: {id}")));
  }
  Ok(Json(history))
}

// ─── Snapshot ─────────────────────────────────────────────────────────────────

/// `GET /entities/:id/snapshots/:sid`
pub async fn get_one<S>(
  State(service): State<Versioning<S>>,
  Path((id, snapshot_id)): Path<(String, Uuid)>,
) -> Result<Json<Snapshot>, ApiError>
where
  S: VersionStore,
{
  Ok(Json(service.snapshot(&id, snapshot_id).await?))
}

/// `GET /entities/:id/snapshots/:sid/diff`
pub async fn diff<S>(
  State(service): State<Versioning<S>>,
  Path((id, snapshot_id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<FieldDiff>>, ApiError>
where
  S: VersionStore,
{
  Ok(Json(service.preview_restore(&id, snapshot_id).await?))
}

// ─── Restore ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RestoreBody {
  pub expected_version: Option<u64>,
}

/// `POST /entities/:id/snapshots/:sid/restore`
///
/// The body may be empty. Returns the restored live entity.
pub async fn restore<S>(
  State(service): State<Versioning<S>>,
  Path((id, snapshot_id)): Path<(String, Uuid)>,
  RequireEditor(editor): RequireEditor,
  headers: HeaderMap,
  body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
  S: VersionStore,
{
  let body: RestoreBody = if body.iter().all(u8::is_ascii_whitespace) {
    RestoreBody::default()
  } else {
    serde_json::from_slice(&body)
      .map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))?
  };

  let if_match = etag::if_match(&headers);
  let guarded = guard_version(&service, &id, if_match).await?;
  let expected = expected_version(body.expected_version, guarded)?;

  let restoration = Restoration {
    entity_id: id,
    snapshot_id,
    editor,
    expected_version: expected,
  };

  let entity = service
    .restore(restoration)
    .await
    .map_err(|e| crate::precondition(e, if_match.is_some()))?;
  Ok(([(header::ETAG, entity_etag(&entity))], Json(entity)))
}
