//! JSON REST API for Tome.
//!
//! Exposes an axum [`Router`] backed by a [`Versioning`] service over any
//! [`VersionStore`]. Authentication, TLS and transport concerns are the
//! caller's responsibility; the authenticated editor arrives in headers.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tome_api::api_router(Versioning::new(store.clone())))
//! ```

pub mod editor;
pub mod entities;
pub mod error;
pub mod etag;
pub mod snapshots;

use axum::{
  Router,
  http::HeaderMap,
  routing::{get, post},
};
use tome_core::{Versioning, store::VersionStore};

pub use error::ApiError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Build a fully-materialised API router for `service`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(service: Versioning<S>) -> Router<()>
where
  S: VersionStore + 'static,
{
  Router::new()
    // Entities
    .route("/entities", get(entities::list::<S>).post(entities::create::<S>))
    .route(
      "/entities/{id}",
      get(entities::get_one::<S>).patch(entities::mutate::<S>),
    )
    // History and restore
    .route("/entities/{id}/history", get(snapshots::history::<S>))
    .route("/entities/{id}/snapshots/{sid}", get(snapshots::get_one::<S>))
    .route("/entities/{id}/snapshots/{sid}/diff", get(snapshots::diff::<S>))
    .route(
      "/entities/{id}/snapshots/{sid}/restore",
      post(snapshots::restore::<S>),
    )
    .with_state(service)
}

// ─── Shared request helpers ──────────────────────────────────────────────────

/// Resolve an `If-Match` header to the version it names.
///
/// Fails with 412 when the tag does not match the live entity.
async fn guard_version<S>(
  service: &Versioning<S>,
  entity_id: &str,
  if_match: Option<&str>,
) -> Result<Option<u64>, ApiError>
where
  S: VersionStore,
{
  let Some(tag) = if_match else {
    return Ok(None);
  };
  let current = service.get(entity_id).await?;
  if !etag::matches(tag, &current) {
    return Err(ApiError::PreconditionFailed);
  }
  Ok(Some(current.version))
}

/// Combine the body's `expected_version` with the version `If-Match`
/// resolved to. Both may be sent, but they must name the same version.
fn expected_version(
  from_body: Option<u64>,
  from_if_match: Option<u64>,
) -> Result<Option<u64>, ApiError> {
  match (from_body, from_if_match) {
    (Some(body), Some(tagged)) if body != tagged => Err(ApiError::BadRequest(
      format!(
        "expected_version {body} disagrees with If-Match (version {tagged})"
      ),
    )),
    (body, tagged) => Ok(body.or(tagged)),
  }
}

/// A version conflict on a request that carried `If-Match` is a failed
/// precondition rather than a plain conflict.
fn precondition(err: tome_core::Error, had_if_match: bool) -> ApiError {
  match err {
    tome_core::Error::Conflict { .. } if had_if_match => {
      ApiError::PreconditionFailed
    }
    other => other.into(),
  }
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
  headers
    .get(IDEMPOTENCY_KEY_HEADER)
    .and_then(|v| v.to_str().ok())
    .map(str::to_owned)
}
