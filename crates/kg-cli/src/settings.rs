//! Application settings: an optional TOML file, overridden by `KG_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

pub const DEFAULT_STORE_PATH: &str = "~/.local/share/kg/knowledge-graph.db";
pub const DEFAULT_RULES_PATH: &str = "nudge-rules.json";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7411;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  pub store_path: PathBuf,
  pub rules_path: PathBuf,
  pub host:       String,
  pub port:       u16,
}

impl Settings {
  /// Read `file` (if present) and the environment, then expand `~/` in both
  /// paths.
  pub fn load(file: &Path) -> anyhow::Result<Self> {
    let raw = config::Config::builder()
      .set_default("store_path", DEFAULT_STORE_PATH)?
      .set_default("rules_path", DEFAULT_RULES_PATH)?
      .set_default("host", DEFAULT_HOST)?
      .set_default("port", i64::from(DEFAULT_PORT))?
      .add_source(config::File::from(file).required(false))
      .add_source(config::Environment::with_prefix("KG"))
      .build()
      .with_context(|| format!("failed to read settings from {}", file.display()))?;

    let settings: Settings = raw
      .try_deserialize()
      .context("failed to deserialise settings")?;

    Ok(Settings {
      store_path: expand_tilde(&settings.store_path),
      rules_path: expand_tilde(&settings.rules_path),
      ..settings
    })
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
