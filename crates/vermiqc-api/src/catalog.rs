//! Handlers for the reference-data endpoints.
//!
//! `GET` lists entries in display order; `POST` inserts or updates one
//! entry by code. A property's data type is fixed once it exists.

use axum::extract::State;
use vermiqc_core::{
  Locale,
  catalog::{Catalog, Product, ProductionLine, Property, Shift},
  store::QcStore,
};

use crate::{AppState, Lang, error::ApiError, extract::Json};

async fn load<S: QcStore>(
  state: &AppState<S>,
  locale: Locale,
) -> Result<Catalog, ApiError> {
  state.store.catalog().await.map_err(|e| ApiError::store(e, locale))
}

// ─── Products ─────────────────────────────────────────────────────────────────

/// `GET /products`
pub async fn list_products<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
) -> Result<Json<Vec<Product>>, ApiError> {
  let mut products: Vec<Product> =
    load(&state, locale).await?.products.into_values().collect();
  products.sort_by(|a, b| (a.display_order, &a.code).cmp(&(b.display_order, &b.code)));
  Ok(Json(products))
}

/// `POST /products`
pub async fn upsert_product<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Json(body): Json<Product>,
) -> Result<Json<Product>, ApiError> {
  let product = state
    .store
    .upsert_product(body)
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  Ok(Json(product))
}

// ─── Properties ───────────────────────────────────────────────────────────────

/// `GET /properties`
pub async fn list_properties<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
) -> Result<Json<Vec<Property>>, ApiError> {
  let mut properties: Vec<Property> =
    load(&state, locale).await?.properties.into_values().collect();
  properties.sort_by(|a, b| (a.display_order, &a.code).cmp(&(b.display_order, &b.code)));
  Ok(Json(properties))
}

/// `POST /properties`
pub async fn upsert_property<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Json(body): Json<Property>,
) -> Result<Json<Property>, ApiError> {
  let property = state
    .store
    .upsert_property(body)
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  Ok(Json(property))
}

// ─── Lines ────────────────────────────────────────────────────────────────────

/// `GET /lines`
pub async fn list_lines<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
) -> Result<Json<Vec<ProductionLine>>, ApiError> {
  Ok(Json(load(&state, locale).await?.lines.into_values().collect()))
}

/// `POST /lines`
pub async fn upsert_line<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Json(body): Json<ProductionLine>,
) -> Result<Json<ProductionLine>, ApiError> {
  let line = state
    .store
    .upsert_line(body)
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  Ok(Json(line))
}

// ─── Shifts ───────────────────────────────────────────────────────────────────

/// `GET /shifts`
pub async fn list_shifts<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
) -> Result<Json<Vec<Shift>>, ApiError> {
  let mut shifts: Vec<Shift> =
    load(&state, locale).await?.shifts.into_values().collect();
  shifts.sort_by(|a, b| (a.display_order, &a.code).cmp(&(b.display_order, &b.code)));
  Ok(Json(shifts))
}

/// `POST /shifts`
pub async fn upsert_shift<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Json(body): Json<Shift>,
) -> Result<Json<Shift>, ApiError> {
  let shift = state
    .store
    .upsert_shift(body)
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  Ok(Json(shift))
}
