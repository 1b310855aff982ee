//! tally-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, seeds the alias table, spawns the refresh worker pool,
//! and serves the JSON API over HTTP.

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use tally_api::AppState;
use tally_core::concept::AliasTable;
use tally_engine::{Ingestor, RefreshQueue};
use tally_store_sqlite::SqliteStore;
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Tally filings metrics server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TALLY"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Open the SQLite store.
  let store = SqliteStore::open(&server_cfg.store_path)
    .await
    .with_context(|| {
      format!("failed to open store at {:?}", server_cfg.store_path)
    })?;
  let store = Arc::new(store);

  // Seed the alias table.
  let mut table = AliasTable::new();
  for alias in &server_cfg.aliases {
    table
      .insert(alias.clone())
      .with_context(|| format!("invalid seed alias {:?}", alias.raw_tag))?;
  }
  tracing::info!(
    aliases = server_cfg.aliases.len(),
    version = table.version(),
    "alias table seeded"
  );
  let aliases = Arc::new(RwLock::new(table));

  // Spawn the refresh worker pool and build application state.
  let queue = RefreshQueue::spawn(
    Arc::clone(&store),
    Arc::clone(&aliases),
    server_cfg.refresh_workers,
  );
  let ingestor =
    Arc::new(Ingestor::new(Arc::clone(&store), aliases, queue));
  let state = AppState { store, ingestor };

  let app = tally_api::api_router(state).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
