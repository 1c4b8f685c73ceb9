//! Server wiring for vermiqc.
//!
//! Holds the runtime configuration, the startup seed loader, and the
//! top-level [`Router`] that mounts the JSON API under `/api`.

pub mod seed;

use std::{path::PathBuf, str::FromStr, time::Duration};

use axum::Router;
use chrono::{FixedOffset, Offset as _, Utc};
use serde::Deserialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use vermiqc_api::{ApiConfig, AppState, api_router};
use vermiqc_core::{Locale, store::QcStore};
use vermiqc_store_sqlite::StoreOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid utc_offset {0:?}; expected e.g. \"-03:00\"")]
  InvalidOffset(String),
}

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `VERMIQC_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                  String,
  #[serde(default = "default_port")]
  pub port:                  u16,
  #[serde(default = "default_store_path")]
  pub store_path:            PathBuf,
  /// Plant offset from UTC, `+HH:MM` or `-HH:MM`.
  #[serde(default = "default_utc_offset")]
  pub utc_offset:            String,
  #[serde(default)]
  pub locale:                Locale,
  #[serde(default = "default_retry_ceiling_ms")]
  pub retry_ceiling_ms:      u64,
  #[serde(default)]
  pub require_specification: bool,
  /// Catalog and specifications to load at startup.
  #[serde(default)]
  pub seed_path:             Option<PathBuf>,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { "vermiqc.db".into() }
fn default_utc_offset() -> String { "+00:00".into() }
fn default_retry_ceiling_ms() -> u64 { 5_000 }

impl ServerConfig {
  pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
    let raw = self.utc_offset.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
      return Ok(Utc.fix());
    }
    FixedOffset::from_str(raw)
      .map_err(|_| ConfigError::InvalidOffset(self.utc_offset.clone()))
  }

  pub fn store_options(&self) -> Result<StoreOptions, ConfigError> {
    Ok(StoreOptions {
      utc_offset:    self.offset()?,
      retry_ceiling: Duration::from_millis(self.retry_ceiling_ms),
    })
  }

  pub fn api_config(&self) -> Result<ApiConfig, ConfigError> {
    Ok(ApiConfig {
      utc_offset:            self.offset()?,
      locale:                self.locale,
      require_specification: self.require_specification,
    })
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full application: the API under `/api`, with request tracing.
pub fn app<S>(state: AppState<S>) -> Router
where
  S: QcStore + 'static,
{
  Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{body::Body, http::Request};
  use tower::ServiceExt as _;
  use vermiqc_store_sqlite::SqliteStore;

  use super::*;

  fn config(offset: &str) -> ServerConfig {
    let toml = format!("utc_offset = \"{offset}\"\nlocale = \"pt-BR\"\n");
    toml::from_str(&toml).unwrap()
  }

  #[test]
  fn defaults_fill_missing_keys() {
    let cfg = config("-03:00");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.locale, Locale::PtBr);
    assert!(cfg.seed_path.is_none());
    assert_eq!(cfg.offset().unwrap().local_minus_utc(), -3 * 3600);
  }

  #[test]
  fn offsets_are_validated() {
    assert_eq!(config("UTC").offset().unwrap().local_minus_utc(), 0);
    assert!(matches!(
      config("Brasília").offset(),
      Err(ConfigError::InvalidOffset(_))
    ));
  }

  #[tokio::test]
  async fn api_is_mounted_under_prefix() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let state = AppState::new(Arc::new(store), ApiConfig::default());

    let req = Request::builder().uri("/api/products").body(Body::empty()).unwrap();
    let resp = app(state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200);

    let req = Request::builder().uri("/products").body(Body::empty()).unwrap();
    let resp = app(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 404);
  }
}
