//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error body has the same shape:
//!
//! ```json
//! { "code": "unknown_shift", "error": "turno desconhecido: D", "field": "shift" }
//! ```

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use vermiqc_core::{DomainError, Locale};

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// A domain error, already rendered in the caller's locale.
  #[error("{message}")]
  Domain {
    status:  StatusCode,
    code:    &'static str,
    message: String,
    field:   Option<String>,
  },

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// A body, query string, or path that did not deserialize.
  #[error("{message}")]
  Malformed { part: &'static str, message: String },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Render a core error in `locale`.
  pub fn domain(err: &vermiqc_core::Error, locale: Locale) -> Self {
    Self::Domain {
      status:  status_for(err.code()),
      code:    err.code(),
      message: err.localized(locale),
      field:   err.field(),
    }
  }

  /// Map a backend error: domain errors keep their code, anything else is
  /// an internal error.
  pub fn store<E>(err: E, locale: Locale) -> Self
  where
    E: std::error::Error + DomainError + Send + Sync + 'static,
  {
    match err.as_domain() {
      Some(domain) => Self::domain(domain, locale),
      None => Self::Store(Box::new(err)),
    }
  }

  /// Reject an unreadable `part` of the request (`body`, `query`, `path`).
  pub fn malformed(locale: Locale, part: &'static str, detail: String) -> Self {
    let message = match locale {
      Locale::En => format!("malformed request {part}: {detail}"),
      Locale::PtBr => {
        let part = match part {
          "body" => "corpo",
          "query" => "consulta",
          _ => "caminho",
        };
        format!("{part} da requisição inválido: {detail}")
      }
    };
    Self::Malformed { part, message }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Domain { status, .. } => *status,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) | ApiError::Malformed { .. } => {
        StatusCode::BAD_REQUEST
      }
      ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

fn status_for(code: &str) -> StatusCode {
  match code {
    "sample_not_found" | "measurement_not_found" => StatusCode::NOT_FOUND,
    "duplicate_sample" | "duplicate_measurement" => StatusCode::CONFLICT,
    "backend_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
    _ => StatusCode::UNPROCESSABLE_ENTITY,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let (code, message, field) = match self {
      ApiError::Domain { code, message, field, .. } => (code, message, field),
      ApiError::NotFound(m) => ("not_found", m, None),
      ApiError::BadRequest(m) => ("bad_request", m, None),
      ApiError::Malformed { part, message } => {
        ("bad_request", message, Some(part.to_owned()))
      }
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        ("internal", e.to_string(), None)
      }
    };
    (status, Json(json!({ "code": code, "error": message, "field": field })))
      .into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn statuses_follow_the_error_code() {
    let locale = Locale::En;
    let cases = [
      (vermiqc_core::Error::DuplicateSample("k".into()), 409),
      (vermiqc_core::Error::UnknownLine("L9".into()), 422),
      (vermiqc_core::Error::BackendUnavailable("locked".into()), 503),
      (vermiqc_core::Error::SampleNotFound(uuid::Uuid::nil()), 404),
    ];
    for (err, status) in cases {
      assert_eq!(ApiError::domain(&err, locale).status().as_u16(), status);
    }
  }

  #[test]
  fn messages_are_localized() {
    let err = vermiqc_core::Error::UnknownShift("D".into());
    let ApiError::Domain { message, field, .. } =
      ApiError::domain(&err, Locale::PtBr)
    else {
      panic!("expected a domain error");
    };
    assert_eq!(message, "turno desconhecido: D");
    assert_eq!(field.as_deref(), Some("shift"));
  }
}
