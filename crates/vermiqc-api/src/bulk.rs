//! `POST /samples/bulk[?strict=&per_row_commit=&update=]` with a CSV body.
//!
//! Rows are grouped into one submission per sample key by
//! [`vermiqc_csv::parse_bulk`]. Unreadable rows and rejected groups are
//! reported as `{row, code, error}` with 1-based file lines. With
//! `strict=true` any error means nothing is committed.
//!
//! If the client disconnects mid-import the handler future is dropped, which
//! cancels the batch at the next group boundary and rolls back whatever is
//! not yet committed.

use axum::extract::State;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use vermiqc_core::{
  ingest::{BatchOptions, BatchReport},
  store::QcStore,
};

use crate::{
  AppState, Lang,
  error::ApiError,
  extract::{Json, Query},
};

#[derive(Debug, Default, Deserialize)]
pub struct BulkParams {
  #[serde(default)]
  pub strict:         bool,
  #[serde(default)]
  pub per_row_commit: bool,
  /// Replace existing samples whose payload differs instead of rejecting
  /// them as duplicates.
  #[serde(default)]
  pub update:         bool,
}

pub async fn handler<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Query(params): Query<BulkParams>,
  body: String,
) -> Result<Json<BatchReport>, ApiError> {
  let parsed = vermiqc_csv::parse_bulk(body.as_bytes())
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
  let parse_errors = parsed.errors;

  if params.strict && !parse_errors.is_empty() {
    tracing::warn!(errors = parse_errors.len(), "strict bulk ingest rejected");
    return Ok(Json(BatchReport {
      errors: parse_errors,
      committed: false,
      ..BatchReport::default()
    }));
  }

  let mut items = parsed.items;
  for item in &mut items {
    item.submission.update = params.update;
    item.submission.require_specification = state.config.require_specification;
  }
  let options = BatchOptions {
    strict:         params.strict,
    per_row_commit: params.per_row_commit,
  };

  let cancel = CancellationToken::new();
  let _guard = cancel.clone().drop_guard();
  let mut report = state
    .store
    .submit_batch(items, options, cancel)
    .await
    .map_err(|e| ApiError::store(e, locale))?;

  report.errors.extend(parse_errors);
  report.errors.sort_by_key(|e| e.row);
  tracing::info!(
    created = report.samples_created,
    updated = report.samples_updated,
    unchanged = report.samples_unchanged,
    errors = report.errors.len(),
    committed = report.committed,
    "bulk ingest finished"
  );
  Ok(Json(report))
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use serde_json::Value;
  use tower::ServiceExt as _;

  use crate::{
    api_router,
    test_helpers::{json_body, make_state, send},
  };

  const CSV: &str = "date,shift,line,product,kind,sequence,property,value,operator\n\
                     2024-03-14,A,L1,V-MED,POINTWISE,1,UMIDADE,5,ana\n\
                     2024-03-14,A,L1,V-MED,POINTWISE,2,UMIDADE,abc,ana\n\
                     2024-03-14,A,L9,V-MED,POINTWISE,3,UMIDADE,5,ana\n\
                     not-a-date,A,L1,V-MED,POINTWISE,3,UMIDADE,5,ana\n";

  async fn post_csv(
    state: &crate::AppState<vermiqc_store_sqlite::SqliteStore>,
    query: &str,
    csv: &str,
  ) -> (StatusCode, Value) {
    let req = Request::builder()
      .method("POST")
      .uri(format!("/samples/bulk{query}"))
      .header("content-type", "text/csv")
      .body(Body::from(csv.to_string()))
      .unwrap();
    let resp = api_router(state.clone()).oneshot(req).await.unwrap();
    (resp.status(), json_body(resp).await)
  }

  #[tokio::test]
  async fn bad_rows_are_skipped_by_default() {
    let state = make_state().await;
    let (status, report) = post_csv(&state, "", CSV).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["committed"], true);
    assert_eq!(report["samples_created"], 1);

    let rows: Vec<u64> = report["errors"]
      .as_array()
      .unwrap()
      .iter()
      .map(|e| e["row"].as_u64().unwrap())
      .collect();
    assert_eq!(rows, vec![3, 4, 5]);
    assert_eq!(report["errors"][0]["code"], "invalid_measurement");
    assert_eq!(report["errors"][1]["code"], "unknown_line");
  }

  #[tokio::test]
  async fn strict_commits_nothing() {
    let state = make_state().await;
    let (_, report) = post_csv(&state, "?strict=true", CSV).await;
    assert_eq!(report["committed"], false);
    assert_eq!(report["samples_created"], 0);

    let list = json_body(send(&state, "GET", "/samples", None).await).await;
    assert!(list.as_array().unwrap().is_empty());
  }

  #[tokio::test]
  async fn reimport_is_unchanged() {
    let state = make_state().await;
    let good = "date,shift,line,product,kind,sequence,property,value,operator\n\
                2024-03-14,A,L1,V-MED,POINTWISE,1,UMIDADE,5,ana\n";
    post_csv(&state, "", good).await;
    let (_, report) = post_csv(&state, "?per_row_commit=true", good).await;
    assert_eq!(report["samples_unchanged"], 1);
    assert_eq!(report["samples_created"], 0);
  }

  #[tokio::test]
  async fn missing_column_is_a_bad_request() {
    let state = make_state().await;
    let (status, body) = post_csv(&state, "", "date,shift\n2024-03-14,A\n").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
  }
}
