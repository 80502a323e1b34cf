//! punch-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, starts the decision loop and an optional line-oriented tag
//! reader, and serves the HTTP API under `/api`.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::Router;
use clap::Parser;
use punch_api::{ApiState, api_router};
use punch_core::{
  engine::DecisionEngine,
  intake,
  notify::Broadcaster,
  policy::PolicyStore,
  reader::ReaderStatus,
  store::AttendanceStore as _,
};
use punch_server::{ServerConfig, bootstrap_policy, expand_tilde, reader};
use punch_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "RFID attendance decision server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Read tags from this device instead of the configured one (`-` for stdin).
  #[arg(long)]
  reader: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg = ServerConfig::load(&cli.config).context("failed to load configuration")?;
  let store_path = expand_tilde(&server_cfg.store_path);

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  for seed in server_cfg.subjects.iter().cloned() {
    let code = seed.code.clone();
    store
      .seed_subject(seed)
      .await
      .with_context(|| format!("failed to seed subject {code}"))?;
  }

  let policy = bootstrap_policy(&store, &server_cfg.policy).await?;
  let policy = Arc::new(PolicyStore::new(policy).context("invalid attendance policy")?);

  let store = Arc::new(store);
  let events = Broadcaster::new();
  let engine = Arc::new(DecisionEngine::new(
    Arc::clone(&store),
    Arc::clone(&policy),
    Arc::new(events.clone()),
  ));

  let (queue, intake) = intake::channel(server_cfg.queue_capacity);
  tokio::spawn({
    let engine = Arc::clone(&engine);
    async move { engine.run(intake).await }
  });

  let reader_status = Arc::new(ReaderStatus::default());
  if let Some(device) = cli.reader.or(server_cfg.reader_device.clone()) {
    let queue = queue.clone();
    let status = Arc::clone(&reader_status);
    tokio::spawn(async move { reader::run(&device, &queue, &status).await });
  }

  let state = ApiState::new(store, policy, queue, events).with_reader(reader_status);
  let app = Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http());

  let address = server_cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!("failed to listen for shutdown signal: {e}");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}
