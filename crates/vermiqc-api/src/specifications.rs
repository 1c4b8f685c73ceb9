//! Handlers for `/specifications` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/specifications` | Active specs; optional `?product=&at=` |
//! | `POST` | `/specifications` | New version for a pair; closes the active one |
//! | `GET`  | `/specifications/{product}/{property}` | Active at `?at=` (default now); 404 if none |
//! | `GET`  | `/specifications/{product}/{property}/history` | Newest first |

use axum::{
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use vermiqc_core::{
  specification::{NewSpecification, Specification},
  store::QcStore,
};

use crate::{
  AppState, Lang,
  error::ApiError,
  extract::{Json, Path, Query},
};

#[derive(Debug, Deserialize)]
pub struct ActiveParams {
  pub product: Option<String>,
  pub at:      Option<DateTime<Utc>>,
}

/// `GET /specifications[?product=<code>&at=<rfc3339>]`
pub async fn list_active<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Query(params): Query<ActiveParams>,
) -> Result<Json<Vec<Specification>>, ApiError> {
  let store = &state.store;
  let catalog = store.catalog().await.map_err(|e| ApiError::store(e, locale))?;

  let mut active = Vec::new();
  for product in catalog.products.keys() {
    if params.product.as_ref().is_some_and(|p| p != product) {
      continue;
    }
    for property in catalog.properties.keys() {
      let spec = store
        .get_active_specification(product.clone(), property.clone(), params.at)
        .await
        .map_err(|e| ApiError::store(e, locale))?;
      active.extend(spec);
    }
  }
  Ok(Json(active))
}

/// `POST /specifications`
pub async fn upsert<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Json(body): Json<NewSpecification>,
) -> Result<impl IntoResponse, ApiError> {
  let spec = state
    .store
    .upsert_specification(body)
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  tracing::info!(
    product = %spec.product,
    property = %spec.property,
    effective_from = %spec.effective_from,
    "specification recorded"
  );
  Ok((StatusCode::CREATED, Json(spec)))
}

#[derive(Debug, Deserialize)]
pub struct AtParams {
  pub at: Option<DateTime<Utc>>,
}

/// `GET /specifications/{product}/{property}[?at=<rfc3339>]`
pub async fn active<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Path((product, property)): Path<(String, String)>,
  Query(params): Query<AtParams>,
) -> Result<Json<Specification>, ApiError> {
  let spec = state
    .store
    .get_active_specification(product.clone(), property.clone(), params.at)
    .await
    .map_err(|e| ApiError::store(e, locale))?
    .ok_or_else(|| {
      ApiError::NotFound(format!("no active specification for {product}/{property}"))
    })?;
  Ok(Json(spec))
}

/// `GET /specifications/{product}/{property}/history`
pub async fn history<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Path((product, property)): Path<(String, String)>,
) -> Result<Json<Vec<Specification>>, ApiError> {
  let specs = state
    .store
    .specification_history(product, property)
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  Ok(Json(specs))
}
