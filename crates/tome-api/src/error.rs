//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  NotFound(String),

  /// A well-formed reference that points somewhere it may not.
  #[error("{0}")]
  Unprocessable(String),

  #[error("{0}")]
  Conflict(String),

  #[error("precondition failed: entity has changed")]
  PreconditionFailed,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("store unavailable: {0}")]
  Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("internal error: {0}")]
  Internal(String),
}

impl From<tome_core::Error> for ApiError {
  fn from(err: tome_core::Error) -> Self {
    use tome_core::Error as E;
    match err {
      E::EntityNotFound(_) | E::SnapshotNotFound(_) => {
        ApiError::NotFound(err.to_string())
      }
      E::InvalidReference { .. } | E::IdempotencyKeyReused { .. } => {
        ApiError::Unprocessable(err.to_string())
      }
      E::EntityExists(_) | E::Conflict { .. } => {
        ApiError::Conflict(err.to_string())
      }
      E::Validation(m) => ApiError::BadRequest(m),
      E::Persistence(e) => ApiError::Unavailable(e),
      E::Serialization(e) => ApiError::Internal(e.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
