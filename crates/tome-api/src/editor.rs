//! Editor identity extractor.
//!
//! Authentication happens upstream; the authenticating proxy forwards the
//! caller's identity in `X-Editor-Id` and `X-Editor-Email`, which are trusted
//! as given.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, request::Parts},
};
use tome_core::snapshot::Editor;

use crate::error::ApiError;

pub const EDITOR_ID_HEADER: &str = "x-editor-id";
pub const EDITOR_EMAIL_HEADER: &str = "x-editor-email";

/// The editor a write is attributed to.
pub struct RequireEditor(pub Editor);

/// Read the editor identity directly from headers.
pub fn editor_from_headers(headers: &HeaderMap) -> Result<Editor, ApiError> {
  let header = |name: &str| {
    headers
      .get(name)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))
  };

  Ok(Editor::new(header(EDITOR_ID_HEADER)?, header(EDITOR_EMAIL_HEADER)?))
}

impl<S> FromRequestParts<S> for RequireEditor
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    editor_from_headers(&parts.headers).map(RequireEditor)
  }
}
