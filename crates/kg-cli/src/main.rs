//! `kg`: command-line front end for the knowledge graph.
//!
//! # Usage
//!
//! ```text
//! kg run upsert_entity '{"name": "Ada Lovelace", "type": "person"}'
//! echo '{"command": "check_all", "args": {}}' | kg bridge
//! kg serve
//! ```
//!
//! `run` and `bridge` print exactly one JSON envelope on stdout; logs go to
//! stderr.

mod settings;

use std::{
  io::Read as _,
  path::PathBuf,
  process::ExitCode,
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use kg_api::{ApiError, AppState, Envelope};
use kg_store_sqlite::SqliteStore;
use serde::Deserialize;
use serde_json::Value;
use settings::Settings;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Personal knowledge graph and nudge engine")]
struct Cli {
  /// Path to the TOML settings file.
  #[arg(short, long, default_value = "kg.toml")]
  config: PathBuf,

  #[command(subcommand)]
  mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
  /// Run one command and print its result envelope.
  Run {
    /// Command name, e.g. `upsert_entity` or `check_all`.
    command: String,
    /// Argument payload as a JSON object.
    args:    Option<String>,
  },
  /// Read `{"command": ..., "args": {...}}` from stdin and answer on stdout.
  Bridge,
  /// Serve `POST /commands/{command}` over HTTP.
  Serve,
}

/// One request on the stdin bridge.
#[derive(Deserialize)]
struct BridgeRequest {
  command: String,
  #[serde(default)]
  args:    Value,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;
  let state = AppState::new(Arc::new(store), settings.rules_path.clone());

  match cli.mode {
    Mode::Run { command, args } => {
      let envelope = match args.as_deref().map(serde_json::from_str::<Value>) {
        None => state.dispatch(&command, Value::Null).await,
        Some(Ok(args)) => state.dispatch(&command, args).await,
        Some(Err(source)) => {
          Envelope::failed(&command, &ApiError::BadArgs { command: "command line", source })
        }
      };
      emit(&envelope)?;
      Ok(if envelope.success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }

    Mode::Bridge => {
      let mut input = String::new();
      std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;
      let envelope = match serde_json::from_str::<BridgeRequest>(&input) {
        Ok(req) => state.dispatch(&req.command, req.args).await,
        Err(source) => {
          tracing::warn!(error = %source, "unreadable bridge request");
          Envelope::failed("", &ApiError::BadArgs { command: "bridge request", source })
        }
      };
      emit(&envelope)?;
      Ok(ExitCode::SUCCESS)
    }

    Mode::Serve => {
      let address = settings.address();
      let app = kg_api::api_router(state);

      tracing::info!("Listening on http://{address}");
      let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

      axum::serve(listener, app).await.context("server error")?;
      Ok(ExitCode::SUCCESS)
    }
  }
}

fn emit(envelope: &Envelope) -> anyhow::Result<()> {
  let text = serde_json::to_string(envelope).context("failed to encode result")?;
  println!("{text}");
  Ok(())
}
