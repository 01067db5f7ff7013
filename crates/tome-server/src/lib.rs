//! HTTP server for Tome.
//!
//! Wraps the JSON API from `tome-api` with request tracing, a body size
//! limit and a health check.

use std::path::PathBuf;

use axum::{Router, extract::DefaultBodyLimit, routing::get};
use serde::Deserialize;
use tome_core::{Versioning, store::VersionStore};
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and `TOME_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:             String,
  pub port:             u16,
  pub store_path:       PathBuf,
  #[serde(default = "default_body_limit")]
  pub body_limit_bytes: usize,
}

fn default_body_limit() -> usize { 1024 * 1024 }

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router: `/healthz` plus the API under `/api`.
pub fn router<S>(service: Versioning<S>, config: &ServerConfig) -> Router
where
  S: VersionStore + 'static,
{
  Router::new()
    .route("/healthz", get(healthz))
    .nest("/api", tome_api::api_router(service))
    .layer(DefaultBodyLimit::max(config.body_limit_bytes))
    .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str { "ok" }

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
  };
  use serde_json::{Value, json};
  use tome_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  use super::*;

  async fn make_app() -> Router {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let config = ServerConfig {
      host:             "127.0.0.1".to_string(),
      port:             8080,
      store_path:       PathBuf::from(":memory:"),
      body_limit_bytes: default_body_limit(),
    };
    router(Versioning::new(Arc::new(store)), &config)
  }

  const EDITOR: [(&str, &str); 2] = [
    ("x-editor-id", "u-1"),
    ("x-editor-email", "admin@example.com"),
  ];

  async fn send(
    app:     &Router,
    method:  &str,
    uri:     &str,
    headers: &[(&str, &str)],
    body:    Option<Value>,
  ) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(*k, *v);
    }
    let req = match body {
      Some(b) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(b.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, json)
  }

  async fn create_course(app: &Router) -> String {
    let (status, headers, _) = send(
      app,
      "POST",
      "/api/entities",
      &[],
      Some(json!({
        "entity_id": "course-1",
        "fields": { "title": "A", "status": "draft" }
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    headers[header::ETAG].to_str().unwrap().to_string()
  }

  async fn patch(
    app: &Router,
    extra: &[(&str, &str)],
    body: Value,
  ) -> (StatusCode, HeaderMap, Value) {
    let mut headers: Vec<(&str, &str)> = EDITOR.to_vec();
    headers.extend_from_slice(extra);
    send(app, "PATCH", "/api/entities/course-1", &headers, Some(body)).await
  }

  // ── Health ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn healthz_returns_200() {
    let app = make_app().await;
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  // ── Entities ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn create_then_get_with_matching_etag() {
    let app = make_app().await;
    let etag = create_course(&app).await;

    let (status, headers, body) = send(&app, "GET", "/api/entities/course-1", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::ETAG].to_str().unwrap(), etag);
    assert_eq!(body["version"], 0);
    assert_eq!(body["fields"]["title"], "A");

    let (status, _, list) = send(&app, "GET", "/api/entities", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn duplicate_create_is_409() {
    let app = make_app().await;
    create_course(&app).await;
    let (status, _, body) = send(
      &app,
      "POST",
      "/api/entities",
      &[],
      Some(json!({ "entity_id": "course-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
  }

  #[tokio::test]
  async fn get_missing_entity_is_404() {
    let app = make_app().await;
    let (status, _, _) = send(&app, "GET", "/api/entities/nope", &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  // ── Mutate ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn patch_without_editor_is_401() {
    let app = make_app().await;
    create_course(&app).await;
    let (status, _, _) = send(
      &app,
      "PATCH",
      "/api/entities/course-1",
      &[],
      Some(json!({ "changes": { "title": "B" }, "change_description": "renamed" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn patch_with_empty_description_is_400() {
    let app = make_app().await;
    create_course(&app).await;
    let (status, _, _) = patch(
      &app,
      &[],
      json!({ "changes": { "title": "B" }, "change_description": "" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, history) =
      send(&app, "GET", "/api/entities/course-1/history", &[], None).await;
    assert!(history["snapshots"].as_array().unwrap().is_empty());
  }

  #[tokio::test]
  async fn patch_with_current_if_match_succeeds() {
    let app = make_app().await;
    let etag = create_course(&app).await;
    let bare = etag.trim_matches('"').to_string();

    let (status, headers, body) = patch(
      &app,
      &[("if-match", bare.as_str())],
      json!({ "changes": { "title": "B" }, "change_description": "renamed" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 1);
    assert_ne!(headers[header::ETAG].to_str().unwrap(), etag);
  }

  #[tokio::test]
  async fn patch_with_stale_if_match_is_412() {
    let app = make_app().await;
    let etag = create_course(&app).await;
    patch(&app, &[], json!({ "changes": { "title": "B" }, "change_description": "one" })).await;

    let (status, _, _) = patch(
      &app,
      &[("if-match", etag.as_str())],
      json!({ "changes": { "title": "C" }, "change_description": "two" }),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
  }

  #[tokio::test]
  async fn patch_with_stale_expected_version_is_409() {
    let app = make_app().await;
    create_course(&app).await;
    patch(&app, &[], json!({ "changes": { "title": "B" }, "change_description": "one" })).await;

    let (status, _, _) = patch(
      &app,
      &[],
      json!({
        "changes": { "title": "C" },
        "change_description": "two",
        "expected_version": 0
      }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn patch_null_removes_field() {
    let app = make_app().await;
    create_course(&app).await;
    let (status, _, body) = patch(
      &app,
      &[],
      json!({ "changes": { "status": null }, "change_description": "drop status" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["fields"].get("status").is_none());
  }

  #[tokio::test]
  async fn repeated_idempotency_key_applies_once() {
    let app = make_app().await;
    create_course(&app).await;
    let body = json!({ "changes": { "title": "B" }, "change_description": "renamed" });

    let (first, _, a) = patch(&app, &[("idempotency-key", "req-1")], body.clone()).await;
    let (second, _, b) = patch(&app, &[("idempotency-key", "req-1")], body).await;
    assert_eq!((first, second), (StatusCode::OK, StatusCode::OK));
    assert_eq!(a["version"], 1);
    assert_eq!(b["version"], 1);

    let (_, _, history) =
      send(&app, "GET", "/api/entities/course-1/history", &[], None).await;
    assert_eq!(history["snapshots"].as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn idempotency_key_reused_for_other_change_is_422() {
    let app = make_app().await;
    create_course(&app).await;

    let (first, _, _) = patch(
      &app,
      &[("idempotency-key", "k1")],
      json!({ "changes": { "title": "B" }, "change_description": "renamed" }),
    )
    .await;
    let (second, _, body) = patch(
      &app,
      &[("idempotency-key", "k1")],
      json!({ "changes": { "title": "C" }, "change_description": "renamed" }),
    )
    .await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("k1"));

    let (_, _, live) = send(&app, "GET", "/api/entities/course-1", &[], None).await;
    assert_eq!(live["fields"]["title"], "B");
    assert_eq!(live["version"], 1);
  }

  #[tokio::test]
  async fn if_match_and_expected_version_disagreeing_is_400() {
    let app = make_app().await;
    let etag = create_course(&app).await;

    let (status, _, _) = patch(
      &app,
      &[("if-match", etag.as_str())],
      json!({
        "changes": { "title": "B" },
        "change_description": "renamed",
        "expected_version": 5
      }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = patch(
      &app,
      &[("if-match", etag.as_str())],
      json!({
        "changes": { "title": "B" },
        "change_description": "renamed",
        "expected_version": 0
      }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 1);
  }

  // ── History and restore ─────────────────────────────────────────────────────

  #[tokio::test]
  async fn history_of_missing_entity_is_404() {
    let app = make_app().await;
    let (status, _, _) =
      send(&app, "GET", "/api/entities/nope/history", &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn rename_publish_restore_over_http() {
    let app = make_app().await;
    create_course(&app).await;
    patch(&app, &[], json!({ "changes": { "title": "B" }, "change_description": "renamed" })).await;
    patch(
      &app,
      &[],
      json!({ "changes": { "status": "published" }, "change_description": "publish" }),
    )
    .await;

    let (status, _, history) =
      send(&app, "GET", "/api/entities/course-1/history", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    let snapshots = history["snapshots"].as_array().unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0]["content"], json!({ "title": "A", "status": "draft" }));
    assert_eq!(snapshots[0]["change_description"], "renamed");
    let first = snapshots[0]["snapshot_id"].as_str().unwrap().to_string();

    let (status, _, diff) = send(
      &app,
      "GET",
      &format!("/api/entities/course-1/snapshots/{first}/diff"),
      &[],
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(diff.as_array().unwrap().len(), 2);

    let (status, _, restored) = send(
      &app,
      "POST",
      &format!("/api/entities/course-1/snapshots/{first}/restore"),
      &EDITOR,
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["fields"], json!({ "title": "A", "status": "draft" }));
    assert_eq!(restored["version"], 3);

    let (_, _, newest) = send(
      &app,
      "GET",
      "/api/entities/course-1/history?order=newest",
      &[],
      None,
    )
    .await;
    let snapshots = newest["snapshots"].as_array().unwrap();
    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots[0]["content"], json!({ "title": "B", "status": "published" }));
    assert_eq!(snapshots[0]["origin"]["kind"], "restore");
    assert_eq!(snapshots[0]["origin"]["target"], first);
  }

  #[tokio::test]
  async fn restore_with_foreign_snapshot_is_422() {
    let app = make_app().await;
    create_course(&app).await;
    send(
      &app,
      "POST",
      "/api/entities",
      &[],
      Some(json!({ "entity_id": "course-2", "fields": { "title": "X" } })),
    )
    .await;
    patch(&app, &[], json!({ "changes": { "title": "B" }, "change_description": "renamed" })).await;

    let (_, _, history) =
      send(&app, "GET", "/api/entities/course-1/history", &[], None).await;
    let sid = history["snapshots"][0]["snapshot_id"].as_str().unwrap().to_string();

    let (status, _, _) = send(
      &app,
      "POST",
      &format!("/api/entities/course-2/snapshots/{sid}/restore"),
      &EDITOR,
      Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _, _) = send(
      &app,
      "GET",
      &format!("/api/entities/course-2/snapshots/{sid}"),
      &[],
      None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  }

  #[tokio::test]
  async fn restore_with_stale_expected_version_is_409() {
    let app = make_app().await;
    create_course(&app).await;
    patch(&app, &[], json!({ "changes": { "title": "B" }, "change_description": "renamed" })).await;

    let (_, _, history) =
      send(&app, "GET", "/api/entities/course-1/history", &[], None).await;
    let sid = history["snapshots"][0]["snapshot_id"].as_str().unwrap().to_string();

    let (status, _, _) = send(
      &app,
      "POST",
      &format!("/api/entities/course-1/snapshots/{sid}/restore"),
      &EDITOR,
      Some(json!({ "expected_version": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn restore_with_disagreeing_if_match_is_400() {
    let app = make_app().await;
    create_course(&app).await;
    let (_, headers, _) =
      patch(&app, &[], json!({ "changes": { "title": "B" }, "change_description": "renamed" }))
        .await;
    let etag = headers[header::ETAG].to_str().unwrap().to_string();

    let (_, _, history) =
      send(&app, "GET", "/api/entities/course-1/history", &[], None).await;
    let sid = history["snapshots"][0]["snapshot_id"].as_str().unwrap().to_string();

    let mut headers: Vec<(&str, &str)> = EDITOR.to_vec();
    headers.push(("if-match", etag.as_str()));
    let (status, _, _) = send(
      &app,
      "POST",
      &format!("/api/entities/course-1/snapshots/{sid}/restore"),
      &headers,
      Some(json!({ "expected_version": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, live) = send(&app, "GET", "/api/entities/course-1", &[], None).await;
    assert_eq!(live["version"], 1);
  }

  #[tokio::test]
  async fn unknown_snapshot_is_404() {
    let app = make_app().await;
    create_course(&app).await;
    let (status, _, _) = send(
      &app,
      "GET",
      "/api/entities/course-1/snapshots/00000000-0000-0000-0000-000000000000",
      &[],
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }
}
