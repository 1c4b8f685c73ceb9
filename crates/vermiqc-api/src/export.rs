//! `GET /export.csv` and `GET /export.json`.
//!
//! Both accept the `/samples` list filters. The CSV is in long format (one
//! line per measurement) and can be posted back to `/samples/bulk`.

use axum::{
  extract::State,
  http::header,
  response::IntoResponse,
};
use vermiqc_core::{
  Locale,
  sample::{SampleFilter, SampleView},
  store::QcStore,
};

use crate::{
  AppState, Lang,
  error::ApiError,
  extract::{Json, Query},
};

async fn views<S: QcStore>(
  state: &AppState<S>,
  locale: Locale,
  filter: &SampleFilter,
) -> Result<Vec<SampleView>, ApiError> {
  let samples = state
    .store
    .list_samples(filter)
    .await
    .map_err(|e| ApiError::store(e, locale))?;

  let mut views = Vec::with_capacity(samples.len());
  for sample in samples {
    // Deleted since listing: skip rather than fail the export.
    if let Some(view) = state
      .store
      .get_sample(sample.sample_id)
      .await
      .map_err(|e| ApiError::store(e, locale))?
    {
      views.push(view);
    }
  }
  Ok(views)
}

/// `GET /export.csv`
pub async fn csv<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Query(filter): Query<SampleFilter>,
) -> Result<impl IntoResponse, ApiError> {
  let views = views(&state, locale, &filter).await?;
  let mut out = Vec::new();
  vermiqc_csv::write_export(&mut out, &views)
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok((
    [
      (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
      (header::CONTENT_DISPOSITION, "attachment; filename=\"vermiqc-export.csv\""),
    ],
    out,
  ))
}

/// `GET /export.json`
pub async fn json<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Query(filter): Query<SampleFilter>,
) -> Result<Json<Vec<SampleView>>, ApiError> {
  Ok(Json(views(&state, locale, &filter).await?))
}

#[cfg(test)]
mod tests {
  use axum::{body::Body, http::Request};
  use tower::ServiceExt as _;

  use crate::{
    api_router,
    test_helpers::{json_body, make_state, send, submission},
  };

  #[tokio::test]
  async fn csv_export_reimports_unchanged() {
    let state = make_state().await;
    send(&state, "POST", "/samples", Some(submission(1, "5,5"))).await;
    send(&state, "POST", "/samples", Some(submission(2, "9"))).await;

    let resp = send(&state, "GET", "/export.csv", None).await;
    assert_eq!(resp.headers()["content-type"], "text/csv; charset=utf-8");
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.contains(",UMIDADE,5.5,"));

    let req = Request::builder()
      .method("POST")
      .uri("/samples/bulk")
      .body(Body::from(text))
      .unwrap();
    let resp = api_router(state.clone()).oneshot(req).await.unwrap();
    let report = json_body(resp).await;
    assert_eq!(report["samples_unchanged"], 2);
    assert!(report["errors"].as_array().unwrap().is_empty());
  }

  async fn export_csv(state: &crate::AppState<vermiqc_store_sqlite::SqliteStore>) -> String {
    let resp = send(state, "GET", "/export.csv", None).await;
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
  }

  #[tokio::test]
  async fn observations_round_trip_through_csv() {
    let state = make_state().await;
    let mut body = submission(1, "5");
    body["observations"] = "umidade ok".into();
    send(&state, "POST", "/samples", Some(body)).await;

    let text = export_csv(&state).await;
    for query in ["", "?update=true"] {
      let req = Request::builder()
        .method("POST")
        .uri(format!("/samples/bulk{query}"))
        .body(Body::from(text.clone()))
        .unwrap();
      let resp = api_router(state.clone()).oneshot(req).await.unwrap();
      let report = json_body(resp).await;
      assert_eq!(report["samples_unchanged"], 1, "bulk{query}");
      assert!(report["errors"].as_array().unwrap().is_empty());
    }

    let list = json_body(send(&state, "GET", "/samples", None).await).await;
    assert_eq!(list[0]["observations"], "umidade ok");
  }

  #[tokio::test]
  async fn json_export_honours_filters() {
    let state = make_state().await;
    send(&state, "POST", "/samples", Some(submission(1, "5"))).await;
    send(&state, "POST", "/samples", Some(submission(2, "11"))).await;

    let resp = send(&state, "GET", "/export.json?verdict=REJECTED", None).await;
    let views = json_body(resp).await;
    assert_eq!(views.as_array().unwrap().len(), 1);
    assert_eq!(views[0]["measurements"][0]["classification"], "REJECTED");
  }
}
