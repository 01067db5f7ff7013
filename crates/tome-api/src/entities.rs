//! Handlers for `/entities` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/entities` | All entities, ordered by id |
//! | `POST`  | `/entities` | Body: `{"entity_id":"course-1","fields":{..}}`; 201 |
//! | `GET`   | `/entities/:id` | Live entity + `ETag` |
//! | `PATCH` | `/entities/:id` | Body: [`MutateBody`]; editor headers required |

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode, header},
  response::IntoResponse,
};
use serde::Deserialize;
use tome_core::{
  Versioning,
  entity::{Entity, NewEntity},
  field::FieldChanges,
  store::VersionStore,
  versioning::Mutation,
};

use crate::{
  editor::RequireEditor,
  error::ApiError,
  etag::{self, entity_etag},
  expected_version, guard_version, idempotency_key,
};

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /entities`
pub async fn list<S>(
  State(service): State<Versioning<S>>,
) -> Result<Json<Vec<Entity>>, ApiError>
where
  S: VersionStore,
{
  Ok(Json(service.list().await?))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /entities`: returns 201 + the entity at version 0.
pub async fn create<S>(
  State(service): State<Versioning<S>>,
  Json(body): Json<NewEntity>,
) -> Result<impl IntoResponse, ApiError>
where
  S: VersionStore,
{
  let entity = service.create(body).await?;
  Ok((
    StatusCode::CREATED,
    [(header::ETAG, entity_etag(&entity))],
    Json(entity),
  ))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /entities/:id`
pub async fn get_one<S>(
  State(service): State<Versioning<S>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
  S: VersionStore,
{
  let entity = service.get(&id).await?;
  Ok(([(header::ETAG, entity_etag(&entity))], Json(entity)))
}

// ─── Mutate ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `PATCH /entities/:id`.
///
/// A `null` change removes the field.
#[derive(Debug, Deserialize)]
pub struct MutateBody {
  pub changes:            FieldChanges,
  pub change_description: String,
  pub expected_version:   Option<u64>,
}

/// `PATCH /entities/:id` with optional `If-Match` and `Idempotency-Key` headers.
pub async fn mutate<S>(
  State(service): State<Versioning<S>>,
  Path(id): Path<String>,
  RequireEditor(editor): RequireEditor,
  headers: HeaderMap,
  Json(body): Json<MutateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: VersionStore,
{
  let if_match = etag::if_match(&headers);
  let guarded = guard_version(&service, &id, if_match).await?;
  let expected = expected_version(body.expected_version, guarded)?;

  let mutation = Mutation {
    entity_id:          id,
    changes:            body.changes,
    editor,
    change_description: body.change_description,
    expected_version:   expected,
    idempotency_key:    idempotency_key(&headers),
  };

  let entity = service
    .mutate(mutation)
    .await
    .map_err(|e| crate::precondition(e, if_match.is_some()))?;
  Ok(([(header::ETAG, entity_etag(&entity))], Json(entity)))
}
