//! ETags for entity resources.
//!
//! An entity's ETag is a SHA-256 hash over its id and version, so it changes
//! exactly when a mutation or restore commits.

use axum::http::{HeaderMap, header};
use sha2::{Digest, Sha256};
use tome_core::entity::Entity;

/// Compute the quoted ETag for `entity_id` at `version`.
pub fn compute_etag(entity_id: &str, version: u64) -> String {
  let mut hasher = Sha256::new();
  hasher.update(entity_id.as_bytes());
  hasher.update([0]);
  hasher.update(version.to_le_bytes());
  format!("\"{}\"", hex::encode(hasher.finalize()))
}

pub fn entity_etag(entity: &Entity) -> String {
  compute_etag(&entity.entity_id, entity.version)
}

/// Strip a weak prefix and surrounding double-quotes from an ETag value.
///
/// Clients send `If-Match` with or without the quotes RFC 7232 requires.
pub fn strip_etag_quotes(s: &str) -> &str {
  s.trim().trim_start_matches("W/").trim_matches('"')
}

/// The raw `If-Match` header, if any.
pub fn if_match(headers: &HeaderMap) -> Option<&str> {
  headers.get(header::IF_MATCH).and_then(|v| v.to_str().ok())
}

/// Whether an `If-Match` value names the entity's current state.
///
/// Accepts `*` and comma-separated lists.
pub fn matches(if_match: &str, entity: &Entity) -> bool {
  let current = entity_etag(entity);
  let current = strip_etag_quotes(&current);
  if_match
    .split(',')
    .map(strip_etag_quotes)
    .any(|candidate| candidate == "*" || candidate == current)
}
