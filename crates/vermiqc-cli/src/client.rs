//! Async HTTP client wrapping the vermiqc JSON API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use thiserror::Error;
use vermiqc_core::{
  dashboard::{DashboardQuery, DashboardReport},
  ingest::{BatchReport, IngestResponse, Submission},
  sample::SampleFilter,
};

/// Connection settings for the vermiqc API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  /// Sent as `Accept-Language`; server messages come back in it.
  pub lang:     Option<String>,
}

/// Why a request failed, in terms the exit code cares about.
#[derive(Debug, Error)]
pub enum ClientError {
  #[error("cannot reach {url}: {source}")]
  Unreachable {
    url:    String,
    #[source]
    source: reqwest::Error,
  },

  #[error("{message} ({code}, HTTP {status})")]
  Api {
    status:  StatusCode,
    code:    String,
    message: String,
    field:   Option<String>,
  },

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),
}

impl ClientError {
  /// `2` for data-validation failures, `3` when the backend is unavailable,
  /// `1` for anything else.
  pub fn exit_code(&self) -> u8 {
    match self {
      ClientError::Unreachable { .. } => 3,
      ClientError::Api { status, .. } => match status.as_u16() {
        503 => 3,
        409 | 422 => 2,
        _ => 1,
      },
      ClientError::Http(_) => 1,
    }
  }
}

/// Body of every API error response.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
  #[serde(default)]
  code:  String,
  #[serde(default)]
  error: String,
  #[serde(default)]
  field: Option<String>,
}

/// Async HTTP client for the vermiqc JSON REST API.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self, ClientError> {
    let client = Client::builder()
      .timeout(Duration::from_secs(300))
      .build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn lang(&self, req: RequestBuilder) -> RequestBuilder {
    match &self.config.lang {
      Some(lang) => req.header(header::ACCEPT_LANGUAGE, lang),
      None => req,
    }
  }

  async fn send(&self, req: RequestBuilder) -> Result<Response, ClientError> {
    let resp = self.lang(req).send().await.map_err(|source| {
      if source.is_connect() || source.is_timeout() {
        ClientError::Unreachable { url: self.config.base_url.clone(), source }
      } else {
        ClientError::Http(source)
      }
    })?;
    tracing::debug!(url = %resp.url(), status = %resp.status(), "response");

    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(api_error(status, &text))
  }

  // ── Ingest ────────────────────────────────────────────────────────────────

  /// `POST /api/samples`
  pub async fn submit(
    &self,
    submission: &Submission,
  ) -> Result<IngestResponse, ClientError> {
    let req = self.client.post(self.url("/samples")).json(submission);
    Ok(self.send(req).await?.json().await?)
  }

  /// `POST /api/samples/bulk?strict=&per_row_commit=&update=`
  pub async fn import(
    &self,
    csv: String,
    strict: bool,
    per_row_commit: bool,
    update: bool,
  ) -> Result<BatchReport, ClientError> {
    let req = self
      .client
      .post(self.url("/samples/bulk"))
      .query(&[
        ("strict", strict),
        ("per_row_commit", per_row_commit),
        ("update", update),
      ])
      .header(header::CONTENT_TYPE, "text/csv")
      .body(csv);
    Ok(self.send(req).await?.json().await?)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// `GET /api/export.csv` or `/api/export.json`, returned verbatim.
  pub async fn export(
    &self,
    extension: &str,
    filter: &SampleFilter,
  ) -> Result<String, ClientError> {
    let req = self
      .client
      .get(self.url(&format!("/export.{extension}")))
      .query(filter);
    Ok(self.send(req).await?.text().await?)
  }

  /// `GET /api/dashboard`
  pub async fn dashboard(
    &self,
    query: &DashboardQuery,
  ) -> Result<DashboardReport, ClientError> {
    let req = self.client.get(self.url("/dashboard")).query(query);
    Ok(self.send(req).await?.json().await?)
  }
}

fn api_error(status: StatusCode, text: &str) -> ClientError {
  let body: ErrorBody = serde_json::from_str(text).unwrap_or_default();
  ClientError::Api {
    status,
    code: if body.code.is_empty() {
      status.as_str().to_string()
    } else {
      body.code
    },
    message: if body.error.is_empty() { text.trim().to_string() } else { body.error },
    field: body.field,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exit_codes_follow_status() {
    let err = |status: u16| api_error(StatusCode::from_u16(status).unwrap(), "");
    assert_eq!(err(409).exit_code(), 2);
    assert_eq!(err(422).exit_code(), 2);
    assert_eq!(err(503).exit_code(), 3);
    assert_eq!(err(400).exit_code(), 1);
    assert_eq!(err(500).exit_code(), 1);
  }

  #[test]
  fn error_body_is_decoded() {
    let body = r#"{"code":"unknown_shift","error":"turno desconhecido: D","field":"shift"}"#;
    let ClientError::Api { code, message, field, .. } =
      api_error(StatusCode::UNPROCESSABLE_ENTITY, body)
    else {
      panic!("expected an API error");
    };
    assert_eq!(code, "unknown_shift");
    assert_eq!(message, "turno desconhecido: D");
    assert_eq!(field.as_deref(), Some("shift"));
  }

  #[test]
  fn non_json_bodies_keep_their_text() {
    let ClientError::Api { code, message, .. } =
      api_error(StatusCode::BAD_GATEWAY, "upstream down\n")
    else {
      panic!("expected an API error");
    };
    assert_eq!(code, "502");
    assert_eq!(message, "upstream down");
  }

  #[tokio::test]
  async fn refused_connection_is_unreachable() {
    let client = ApiClient::new(ApiConfig {
      base_url: "http://127.0.0.1:1".into(),
      lang:     None,
    })
    .unwrap();
    let query = DashboardQuery {
      from:        chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
      to:          chrono::NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
      line:        None,
      product:     None,
      shift:       None,
      granularity: Default::default(),
    };
    let err = client.dashboard(&query).await.unwrap_err();
    assert_eq!(err.exit_code(), 3);
  }
}
