//! Async HTTP client wrapping the Tome JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tome_core::{
  diff::FieldDiff,
  entity::{Entity, NewEntity},
  field::FieldChanges,
  snapshot::Editor,
  versioning::{History, HistoryOrder},
};
use uuid::Uuid;

/// Connection settings for the Tome API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  /// Sent as `X-Editor-Id` / `X-Editor-Email` on writes.
  pub editor:   Option<Editor>,
}

/// Async HTTP client for the Tome JSON REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

/// An edit as sent to `PATCH /api/entities/{id}`.
#[derive(Debug, Serialize)]
pub struct Edit {
  pub changes:            FieldChanges,
  pub change_description: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub expected_version:   Option<u64>,
  #[serde(skip)]
  pub idempotency_key:    Option<String>,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!(
      "{}/api{}",
      self.config.base_url.trim_end_matches('/'),
      path
    )
  }

  /// Attach the editor headers; writes fail locally without them.
  fn as_editor(&self, req: RequestBuilder) -> Result<RequestBuilder> {
    let editor = self.config.editor.as_ref().ok_or_else(|| {
      anyhow!("editor identity required: set --editor-id and --editor-email")
    })?;
    Ok(
      req
        .header("x-editor-id", &editor.user_id)
        .header("x-editor-email", &editor.email),
    )
  }

  // ── Entities ──────────────────────────────────────────────────────────────

  /// `GET /api/entities`
  pub async fn list_entities(&self) -> Result<Vec<Entity>> {
    let resp = self
      .client
      .get(self.url("/entities"))
      .send()
      .await
      .context("GET /entities failed")?;
    decode(resp, "GET /entities").await
  }

  /// `GET /api/entities/{id}`
  pub async fn get_entity(&self, id: &str) -> Result<Entity> {
    let path = format!("/entities/{id}");
    let resp = self
      .client
      .get(self.url(&path))
      .send()
      .await
      .with_context(|| format!("GET {path} failed"))?;
    decode(resp, &format!("GET {path}")).await
  }

  /// `POST /api/entities`
  pub async fn create_entity(&self, input: &NewEntity) -> Result<Entity> {
    let resp = self
      .client
      .post(self.url("/entities"))
      .json(input)
      .send()
      .await
      .context("POST /entities failed")?;
    decode(resp, "POST /entities").await
  }

  /// `PATCH /api/entities/{id}`
  pub async fn edit_entity(&self, id: &str, edit: &Edit) -> Result<Entity> {
    let path = format!("/entities/{id}");
    let mut req = self.as_editor(self.client.patch(self.url(&path)))?;
    if let Some(key) = &edit.idempotency_key {
      req = req.header("idempotency-key", key);
    }
    let resp = req
      .json(edit)
      .send()
      .await
      .with_context(|| format!("PATCH {path} failed"))?;
    decode(resp, &format!("PATCH {path}")).await
  }

  // ── History ───────────────────────────────────────────────────────────────

  /// `GET /api/entities/{id}/history?order=<order>`
  pub async fn history(&self, id: &str, order: HistoryOrder) -> Result<History> {
    let path = format!("/entities/{id}/history");
    let order = match order {
      HistoryOrder::Oldest => "oldest",
      HistoryOrder::Newest => "newest",
    };
    let resp = self
      .client
      .get(self.url(&path))
      .query(&[("order", order)])
      .send()
      .await
      .with_context(|| format!("GET {path} failed"))?;
    decode(resp, &format!("GET {path}")).await
  }

  /// `GET /api/entities/{id}/snapshots/{sid}/diff`
  pub async fn preview_restore(
    &self,
    id: &str,
    snapshot_id: Uuid,
  ) -> Result<Vec<FieldDiff>> {
    let path = format!("/entities/{id}/snapshots/{snapshot_id}/diff");
    let resp = self
      .client
      .get(self.url(&path))
      .send()
      .await
      .with_context(|| format!("GET {path} failed"))?;
    decode(resp, &format!("GET {path}")).await
  }

  /// `POST /api/entities/{id}/snapshots/{sid}/restore`
  pub async fn restore(
    &self,
    id: &str,
    snapshot_id: Uuid,
    expected_version: Option<u64>,
  ) -> Result<Entity> {
    let path = format!("/entities/{id}/snapshots/{snapshot_id}/restore");
    let resp = self
      .as_editor(self.client.post(self.url(&path)))?
      .json(&json!({ "expected_version": expected_version }))
      .send()
      .await
      .with_context(|| format!("POST {path} failed"))?;
    decode(resp, &format!("POST {path}")).await
  }
}

/// Decode a success body, or turn the server's `{"error": ..}` body into an
/// error message.
async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
  let status = resp.status();
  if !status.is_success() {
    let message = resp
      .json::<serde_json::Value>()
      .await
      .ok()
      .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
      .unwrap_or_else(|| status.to_string());
    return Err(anyhow!("{what} → {status}: {message}"));
  }
  resp
    .json()
    .await
    .with_context(|| format!("deserialising {what} response"))
}
