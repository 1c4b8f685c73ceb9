//! vermiqc server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered with
//! `VERMIQC_*` environment variables, opens the SQLite store, applies the
//! optional seed file, and serves the JSON API under `/api`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vermiqc_api::AppState;
use vermiqc_server::{ServerConfig, seed::Seed};
use vermiqc_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "vermiqc quality-control server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Apply the seed file and exit without serving.
  #[arg(long)]
  seed_only: bool,
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

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("VERMIQC"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path, server_cfg.store_options()?)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if let Some(seed_path) = &server_cfg.seed_path {
    let seed = Seed::load(&expand_tilde(seed_path)).await?;
    seed
      .apply(&store)
      .await
      .with_context(|| format!("failed to apply seed {seed_path:?}"))?;
  }
  if cli.seed_only {
    return Ok(());
  }

  let state = AppState::new(Arc::new(store), server_cfg.api_config()?);
  let app = vermiqc_server::app(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!(
    utc_offset = %server_cfg.utc_offset,
    "Listening on http://{address}/api"
  );
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
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
