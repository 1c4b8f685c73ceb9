//! `GET /dashboard?from=&to=[&line=&product=&shift=&granularity=hour|shift|day]`
//!
//! The window is `[from, to)` over declared sample dates. "Today" is the
//! current date at the plant offset, not at UTC.

use axum::extract::State;
use chrono::Utc;
use vermiqc_core::{
  dashboard::{self, DashboardQuery, DashboardReport},
  store::QcStore,
};

use crate::{
  AppState, Lang,
  error::ApiError,
  extract::{Json, Query},
};

pub async fn handler<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardReport>, ApiError> {
  if query.from > query.to {
    return Err(ApiError::BadRequest(format!(
      "window start {} is after its end {}",
      query.from, query.to
    )));
  }
  let offset = state.config.utc_offset;
  let today = Utc::now().with_timezone(&offset).date_naive();

  let catalog = state
    .store
    .catalog()
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  let views = state
    .store
    .dashboard_snapshot(&query, today)
    .await
    .map_err(|e| ApiError::store(e, locale))?;

  let report = dashboard::build(&query, &views, today, offset, &catalog.shifts);
  tracing::debug!(
    samples = report.samples_total,
    rejected = report.samples_rejected,
    "dashboard built"
  );
  Ok(Json(report))
}

#[cfg(test)]
mod tests {
  use axum::http::StatusCode;
  use serde_json::json;

  use crate::test_helpers::{json_body, make_state, send, submission};

  #[tokio::test]
  async fn counts_samples_in_the_window() {
    let state = make_state().await;
    send(&state, "POST", "/samples", Some(submission(1, "5"))).await;
    send(&state, "POST", "/samples", Some(submission(2, "9"))).await;
    send(&state, "POST", "/samples", Some(submission(3, "11"))).await;
    let mut other_day = submission(1, "11");
    other_day["date"] = json!("2024-03-20");
    send(&state, "POST", "/samples", Some(other_day)).await;

    let resp = send(
      &state,
      "GET",
      "/dashboard?from=2024-03-14&to=2024-03-15&granularity=shift",
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let report = json_body(resp).await;
    assert_eq!(report["samples_total"], 3);
    assert_eq!(report["samples_approved"], 1);
    assert_eq!(report["samples_alert"], 1);
    assert_eq!(report["samples_rejected"], 1);
    assert_eq!(report["series"].as_array().unwrap().len(), 1);
    assert_eq!(report["series"][0]["bucket_start"], "2024-03-14T06:00:00");
  }

  #[tokio::test]
  async fn inverted_window_is_a_bad_request() {
    let state = make_state().await;
    let resp =
      send(&state, "GET", "/dashboard?from=2024-03-15&to=2024-03-14", None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["code"], "bad_request");
  }
}
