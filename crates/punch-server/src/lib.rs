//! Server wiring for the attendance engine: configuration and the reader
//! adapter. The binary in `main.rs` assembles these with the store, the
//! decision loop and the HTTP API.

pub mod reader;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use punch_core::{policy::PolicySnapshot, store::AttendanceStore, subject::SubjectSeed};
use serde::Deserialize;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `PUNCH_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:           String,
  #[serde(default = "default_port")]
  pub port:           u16,
  #[serde(default = "default_store_path")]
  pub store_path:     PathBuf,
  /// Undecided scans buffered between producers and the decision loop.
  #[serde(default = "default_queue_capacity")]
  pub queue_capacity: usize,
  /// Line-oriented tag source: a device path, or `-` for stdin. No reader
  /// runs when unset; scans then only arrive through `POST /api/scans`.
  #[serde(default)]
  pub reader_device:  Option<String>,
  /// Initial policy. Ignored once a policy has been persisted in the store.
  #[serde(default)]
  pub policy:         PolicySnapshot,
  /// Directory bootstrap, inserted if missing on every start.
  #[serde(default)]
  pub subjects:       Vec<SubjectSeed>,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 5000 }

fn default_store_path() -> PathBuf { PathBuf::from("checkins.db") }

fn default_queue_capacity() -> usize { 256 }

impl ServerConfig {
  /// Layer the optional config file under `PUNCH_*` environment variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("PUNCH"))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Pick the startup policy. A persisted policy wins; otherwise the configured
/// one is validated and saved.
pub async fn bootstrap_policy<S>(store: &S, configured: &PolicySnapshot) -> anyhow::Result<PolicySnapshot>
where
  S: AttendanceStore,
{
  if let Some(saved) = store.load_policy().await.context("failed to load saved policy")? {
    tracing::info!("using persisted attendance policy");
    return Ok(saved);
  }
  configured.validate().context("invalid attendance policy in configuration")?;
  store
    .save_policy(configured)
    .await
    .context("failed to persist initial policy")?;
  Ok(configured.clone())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use config::{Config, File, FileFormat};
  use punch_core::policy::Window;
  use punch_store_sqlite::SqliteStore;

  use super::*;

  fn parse(toml: &str) -> ServerConfig {
    Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_config_uses_defaults() {
    let cfg = parse("");
    assert_eq!(cfg.address(), "127.0.0.1:5000");
    assert_eq!(cfg.store_path, PathBuf::from("checkins.db"));
    assert_eq!(cfg.policy, PolicySnapshot::default());
    assert!(cfg.reader_device.is_none());
    assert!(cfg.subjects.is_empty());
  }

  #[test]
  fn full_config_parses() {
    let cfg = parse(
      r#"
        host = "0.0.0.0"
        port = 8080
        reader_device = "-"

        [policy]
        cooldown_secs = 15
        reader_id = "SIDE_DOOR"
        checkin = { start = "08:00", end = "08:30" }
        checkout = { start = "17:00", end = "17:30" }

        [[subjects]]
        code = "EMP001"
        name = "Alice"
        tags = ["ABCD0286"]

        [[subjects]]
        code = "EMP002"
        name = "Bob"
      "#,
    );
    assert_eq!(cfg.address(), "0.0.0.0:8080");
    assert_eq!(cfg.reader_device.as_deref(), Some("-"));
    assert_eq!(cfg.policy.cooldown_secs, 15);
    assert_eq!(cfg.policy.checkin.start.to_string(), "08:00:00");
    assert_eq!(cfg.subjects.len(), 2);
    assert_eq!(cfg.subjects[0].tags, ["ABCD0286"]);
    assert!(cfg.subjects[1].tags.is_empty());
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(
      expand_tilde(Path::new("~/punch/checkins.db")),
      PathBuf::from(home).join("punch/checkins.db")
    );
    assert_eq!(expand_tilde(Path::new("/var/db")), PathBuf::from("/var/db"));
  }

  #[test]
  fn partial_policy_table_fills_in_defaults() {
    let cfg = parse("[policy]\ncooldown_secs = 15\n");
    assert_eq!(cfg.policy.cooldown_secs, 15);
    assert_eq!(cfg.policy.checkin, PolicySnapshot::default().checkin);
    assert_eq!(cfg.policy.checkout, PolicySnapshot::default().checkout);
    assert_eq!(cfg.policy.reader_id, "MAIN_ENTRANCE");
  }

  fn configured() -> PolicySnapshot {
    PolicySnapshot { cooldown_secs: 20, reader_id: "SIDE_DOOR".into(), ..PolicySnapshot::default() }
  }

  #[tokio::test]
  async fn first_start_persists_configured_policy() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let chosen = bootstrap_policy(&store, &configured()).await.unwrap();
    assert_eq!(chosen, configured());
    assert_eq!(store.load_policy().await.unwrap(), Some(configured()));
  }

  #[tokio::test]
  async fn persisted_policy_wins_over_configuration() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let saved = PolicySnapshot { cooldown_secs: 45, ..PolicySnapshot::default() };
    store.save_policy(&saved).await.unwrap();

    let chosen = bootstrap_policy(&store, &configured()).await.unwrap();
    assert_eq!(chosen, saved);
    assert_eq!(store.load_policy().await.unwrap(), Some(saved));
  }

  #[tokio::test]
  async fn invalid_configured_policy_is_not_persisted() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let bad = PolicySnapshot {
      checkin: Window::hm((10, 0), (9, 0)).unwrap(),
      ..PolicySnapshot::default()
    };
    assert!(bootstrap_policy(&store, &bad).await.is_err());
    assert!(store.load_policy().await.unwrap().is_none());
  }
}
