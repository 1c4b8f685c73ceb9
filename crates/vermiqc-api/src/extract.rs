//! Request extractors whose rejections use the API error body.
//!
//! axum's own `Json`, `Query`, and `Path` answer malformed input with a
//! plain-text body. These wrappers turn the rejection into
//! [`ApiError::Malformed`] in the request's locale, with `field` naming the
//! part of the request that failed. [`Json`] also serves as the response
//! body type, so handlers use it in both positions.

use axum::{
  extract::{FromRequest, FromRequestParts, Request},
  http::{HeaderMap, request::Parts},
  response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{ApiError, AppState, request_locale};

/// [`axum::Json`] with an [`ApiError`] rejection.
#[derive(Debug)]
pub struct Json<T>(pub T);

/// [`axum::extract::Query`] with an [`ApiError`] rejection.
#[derive(Debug)]
pub struct Query<T>(pub T);

/// [`axum::extract::Path`] with an [`ApiError`] rejection.
#[derive(Debug)]
pub struct Path<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
  fn into_response(self) -> Response { axum::Json(self.0).into_response() }
}

fn rejected<S>(
  headers: &HeaderMap,
  state: &AppState<S>,
  part: &'static str,
  rejection: impl std::fmt::Display,
) -> ApiError {
  let locale = request_locale(headers, state.config.locale);
  ApiError::malformed(locale, part, rejection.to_string())
}

impl<T, S> FromRequest<AppState<S>> for Json<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request(
    req: Request,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let headers = req.headers().clone();
    match axum::Json::<T>::from_request(req, state).await {
      Ok(axum::Json(value)) => Ok(Json(value)),
      Err(rejection) => Err(rejected(&headers, state, "body", rejection)),
    }
  }
}

impl<T, S> FromRequestParts<AppState<S>> for Query<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    match axum::extract::Query::<T>::from_request_parts(parts, state).await {
      Ok(axum::extract::Query(value)) => Ok(Query(value)),
      Err(rejection) => Err(rejected(&parts.headers, state, "query", rejection)),
    }
  }
}

impl<T, S> FromRequestParts<AppState<S>> for Path<T>
where
  T: DeserializeOwned + Send,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    match axum::extract::Path::<T>::from_request_parts(parts, state).await {
      Ok(axum::extract::Path(value)) => Ok(Path(value)),
      Err(rejection) => Err(rejected(&parts.headers, state, "path", rejection)),
    }
  }
}
