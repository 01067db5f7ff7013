//! `tome`: command-line client for a Tome server.
//!
//! # Usage
//!
//! ```text
//! tome --url http://localhost:8080 list
//! tome edit course-1 --set title="Advanced Fiqh" -m "renamed course"
//! tome history course-1 --newest-first
//! tome restore course-1 <snapshot-id>
//! ```

mod assign;
mod client;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig, Edit};
use serde::Deserialize;
use tome_core::{
  entity::NewEntity,
  field::{FieldChanges, FieldValue},
  snapshot::Editor,
  versioning::HistoryOrder,
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tome", about = "Command-line client for the Tome entity store")]
struct Args {
  /// Path to a TOML config file (url, editor_id, editor_email).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the tome server (default: http://localhost:8080).
  #[arg(long, env = "TOME_URL")]
  url: Option<String>,

  /// Identity recorded on edits and restores.
  #[arg(long, env = "TOME_EDITOR_ID")]
  editor_id: Option<String>,

  #[arg(long, env = "TOME_EDITOR_EMAIL")]
  editor_email: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List all entities.
  List,
  /// Show an entity's live fields.
  Show { id: String },
  /// Create an entity.
  Create {
    /// Entity id; generated by the server when omitted.
    #[arg(long)]
    id:  Option<String>,
    /// Initial field, as key=value. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = assign::parse_assignment)]
    set: Vec<(String, FieldValue)>,
  },
  /// Edit an entity's fields, recording the previous state.
  Edit {
    id:              String,
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = assign::parse_assignment)]
    set:             Vec<(String, FieldValue)>,
    /// Remove a field. Repeatable.
    #[arg(long = "unset", value_name = "KEY")]
    unset:           Vec<String>,
    /// Change description.
    #[arg(short = 'm', long = "message")]
    message:         String,
    /// Fail instead of overwriting if the entity is no longer at this version.
    #[arg(long)]
    expect_version:  Option<u64>,
    #[arg(long)]
    idempotency_key: Option<String>,
  },
  /// Show an entity's snapshot history.
  History {
    id:           String,
    #[arg(long)]
    newest_first: bool,
  },
  /// Show what restoring a snapshot would change.
  Diff { id: String, snapshot: Uuid },
  /// Restore an entity to a snapshot's content.
  Restore {
    id:             String,
    snapshot:       Uuid,
    #[arg(long)]
    expect_version: Option<u64>,
  },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:          String,
  #[serde(default)]
  editor_id:    String,
  #[serde(default)]
  editor_email: String,
}

fn non_empty(s: &str) -> Option<String> {
  (!s.is_empty()).then(|| s.to_owned())
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags and env override the config file, which overrides defaults.
  let editor_id = args.editor_id.or_else(|| non_empty(&file_cfg.editor_id));
  let editor_email = args
    .editor_email
    .or_else(|| non_empty(&file_cfg.editor_email));
  let api_config = ApiConfig {
    base_url: args
      .url
      .or_else(|| non_empty(&file_cfg.url))
      .unwrap_or_else(|| "http://localhost:8080".to_string()),
    editor:   editor_id
      .zip(editor_email)
      .map(|(id, email)| Editor::new(id, email)),
  };
  tracing::debug!(url = %api_config.base_url, "using server");

  let client = ApiClient::new(api_config)?;
  run(&client, args.command).await
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
  match command {
    Command::List => {
      for e in client.list_entities().await? {
        println!("{}", render::entity_row(&e));
      }
    }
    Command::Show { id } => {
      print!("{}", render::entity(&client.get_entity(&id).await?));
    }
    Command::Create { id, set } => {
      let input = NewEntity { entity_id: id, fields: set.into_iter().collect() };
      print!("{}", render::entity(&client.create_entity(&input).await?));
    }
    Command::Edit { id, set, unset, message, expect_version, idempotency_key } => {
      let mut changes: FieldChanges =
        set.into_iter().map(|(k, v)| (k, Some(v))).collect();
      changes.extend(unset.into_iter().map(|k| (k, None)));
      let edit = Edit {
        changes,
        change_description: message,
        expected_version: expect_version,
        idempotency_key,
      };
      print!("{}", render::entity(&client.edit_entity(&id, &edit).await?));
    }
    Command::History { id, newest_first } => {
      let order = if newest_first { HistoryOrder::Newest } else { HistoryOrder::Oldest };
      let history = client.history(&id, order).await?;
      if history.snapshots.is_empty() {
        println!("{id} has no history");
      }
      for s in &history.snapshots {
        print!("{}", render::snapshot(s));
      }
    }
    Command::Diff { id, snapshot } => {
      print!("{}", render::diff(&client.preview_restore(&id, snapshot).await?));
    }
    Command::Restore { id, snapshot, expect_version } => {
      let entity = client.restore(&id, snapshot, expect_version).await?;
      print!("{}", render::entity(&entity));
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory as _;

  use super::*;

  #[test]
  fn cli_definition_is_valid() { Args::command().debug_assert(); }

  #[test]
  fn edit_collects_sets_and_unsets() {
    let args = Args::try_parse_from([
      "tome", "edit", "course-1", "--set", "title=B", "--set", "price=10",
      "--unset", "status", "-m", "renamed", "--expect-version", "2",
    ])
    .unwrap();

    let Command::Edit { id, set, unset, message, expect_version, .. } = args.command
    else {
      panic!("expected edit");
    };
    assert_eq!(id, "course-1");
    assert_eq!(set, vec![
      ("title".to_string(), FieldValue::Text("B".into())),
      ("price".to_string(), FieldValue::Number(10.0)),
    ]);
    assert_eq!(unset, vec!["status"]);
    assert_eq!(message, "renamed");
    assert_eq!(expect_version, Some(2));
  }

  #[test]
  fn edit_requires_message() {
    assert!(Args::try_parse_from(["tome", "edit", "course-1", "--set", "a=1"]).is_err());
  }
}
