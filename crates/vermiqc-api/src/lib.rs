//! JSON REST API for vermiqc.
//!
//! Exposes an axum [`Router`] backed by any [`vermiqc_core::store::QcStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", vermiqc_api::api_router(state))
//! ```

pub mod bulk;
pub mod catalog;
pub mod dashboard;
pub mod error;
pub mod etag;
pub mod export;
pub mod extract;
pub mod samples;
pub mod specifications;

use std::{convert::Infallible, sync::Arc};

use axum::{
  Router,
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
  routing::{delete, get, post, put},
};
use chrono::{FixedOffset, Offset as _, Utc};
use vermiqc_core::{Locale, store::QcStore};

pub use error::ApiError;

// ─── State ────────────────────────────────────────────────────────────────────

/// Plant settings the handlers need.
#[derive(Debug, Clone, Copy)]
pub struct ApiConfig {
  /// Plant offset; decides what "today" is on the dashboard.
  pub utc_offset:            FixedOffset,
  /// Message language when the request carries no `Accept-Language`.
  pub locale:                Locale,
  /// Reject measurements without an active specification on every ingest.
  pub require_specification: bool,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      utc_offset:            Utc.fix(),
      locale:                Locale::En,
      require_specification: false,
    }
  }
}

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:  Arc<S>,
  pub config: Arc<ApiConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), config: Arc::clone(&self.config) }
  }
}

impl<S> AppState<S> {
  pub fn new(store: Arc<S>, config: ApiConfig) -> Self {
    Self { store, config: Arc::new(config) }
  }
}

/// The locale of the current request: the first `Accept-Language` tag we
/// understand, else the configured default.
#[derive(Debug, Clone, Copy)]
pub struct Lang(pub Locale);

impl<S> FromRequestParts<AppState<S>> for Lang
where
  S: Send + Sync,
{
  type Rejection = Infallible;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    Ok(Lang(request_locale(&parts.headers, state.config.locale)))
  }
}

fn request_locale(headers: &HeaderMap, default: Locale) -> Locale {
  headers
    .get(header::ACCEPT_LANGUAGE)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').find_map(Locale::from_tag))
    .unwrap_or(default)
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: QcStore + 'static,
{
  Router::new()
    // Samples
    .route("/samples", get(samples::list::<S>).post(samples::ingest::<S>))
    .route("/samples/bulk", post(bulk::handler::<S>))
    .route(
      "/samples/{id}",
      get(samples::get_one::<S>).delete(samples::delete_one::<S>),
    )
    .route("/samples/{id}/seal", post(samples::seal::<S>))
    .route("/samples/{id}/measurements", post(samples::attach::<S>))
    .route(
      "/samples/{id}/measurements/{property}",
      put(samples::upsert_measurement::<S>),
    )
    .route("/measurements/{id}", delete(samples::detach::<S>))
    // Dashboard and exports
    .route("/dashboard", get(dashboard::handler::<S>))
    .route("/export.csv", get(export::csv::<S>))
    .route("/export.json", get(export::json::<S>))
    // Specifications
    .route(
      "/specifications",
      get(specifications::list_active::<S>).post(specifications::upsert::<S>),
    )
    .route(
      "/specifications/{product}/{property}",
      get(specifications::active::<S>),
    )
    .route(
      "/specifications/{product}/{property}/history",
      get(specifications::history::<S>),
    )
    // Catalog
    .route(
      "/products",
      get(catalog::list_products::<S>).post(catalog::upsert_product::<S>),
    )
    .route(
      "/properties",
      get(catalog::list_properties::<S>).post(catalog::upsert_property::<S>),
    )
    .route(
      "/lines",
      get(catalog::list_lines::<S>).post(catalog::upsert_line::<S>),
    )
    .route(
      "/shifts",
      get(catalog::list_shifts::<S>).post(catalog::upsert_shift::<S>),
    )
    .with_state(state)
}

// ─── Shared test helpers ──────────────────────────────────────────────────────
