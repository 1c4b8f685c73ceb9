//! Handlers for `/samples` and `/measurements` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/samples` | Ingest one submission; 201 created, 200 unchanged/updated |
//! | `GET`    | `/samples` | Filters: `date_from,date_to,line,product,shift,kind,verdict,limit,offset` |
//! | `GET`    | `/samples/{id}` | Sample view with `ETag`; honours `If-None-Match` |
//! | `DELETE` | `/samples/{id}` | 204; measurements cascade |
//! | `POST`   | `/samples/{id}/seal` | Idempotent re-seal |
//! | `POST`   | `/samples/{id}/measurements` | 201; 409 if the property is measured |
//! | `PUT`    | `/samples/{id}/measurements/{property}` | Add or replace |
//! | `DELETE` | `/measurements/{id}` | 204 |

use axum::{
  extract::State,
  http::{HeaderMap, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;
use vermiqc_core::{
  ingest::{IngestResponse, IngestStatus, Submission},
  sample::{Measurement, NewMeasurement, Sample, SampleFilter, SampleView},
  store::QcStore,
};

use crate::{
  AppState, Lang,
  error::ApiError,
  etag::compute_etag,
  extract::{Json, Path, Query},
};

// ─── Ingest ───────────────────────────────────────────────────────────────────

/// `POST /samples`
pub async fn ingest<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Json(mut submission): Json<Submission>,
) -> Result<impl IntoResponse, ApiError> {
  submission.require_specification |= state.config.require_specification;
  let outcome = state
    .store
    .submit(submission)
    .await
    .map_err(|e| ApiError::store(e, locale))?;

  let status = match outcome.status {
    IngestStatus::Created => StatusCode::CREATED,
    IngestStatus::Unchanged | IngestStatus::Updated => StatusCode::OK,
  };
  tracing::info!(
    sample_id = %outcome.view.sample.sample_id,
    status = %outcome.status,
    verdict = %outcome.view.sample.verdict,
    "sample ingested"
  );
  Ok((status, Json(IngestResponse::from(outcome))))
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /samples[?date_from=&date_to=&line=&product=&shift=&kind=&verdict=&limit=&offset=]`
pub async fn list<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Query(filter): Query<SampleFilter>,
) -> Result<Json<Vec<Sample>>, ApiError> {
  let samples = state
    .store
    .list_samples(&filter)
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  Ok(Json(samples))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

async fn load<S: QcStore>(
  state: &AppState<S>,
  locale: vermiqc_core::Locale,
  id: Uuid,
) -> Result<SampleView, ApiError> {
  state
    .store
    .get_sample(id)
    .await
    .map_err(|e| ApiError::store(e, locale))?
    .ok_or_else(|| {
      ApiError::domain(&vermiqc_core::Error::SampleNotFound(id), locale)
    })
}

/// `GET /samples/{id}`
pub async fn get_one<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
) -> Result<Response, ApiError> {
  let view = load(&state, locale, id).await?;
  let etag = compute_etag(&view);

  let fresh = headers
    .get(header::IF_NONE_MATCH)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| v.split(',').any(|t| t.trim() == etag));
  let etag = HeaderValue::from_str(&etag)
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  if fresh {
    return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
  }
  Ok(([(header::ETAG, etag)], Json(view)).into_response())
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /samples/{id}`
pub async fn delete_one<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  state
    .store
    .delete_sample(id)
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Seal ─────────────────────────────────────────────────────────────────────

/// `POST /samples/{id}/seal`
pub async fn seal<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Path(id): Path<Uuid>,
) -> Result<Json<SampleView>, ApiError> {
  let view = state
    .store
    .seal(id)
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  Ok(Json(view))
}

// ─── Measurements ─────────────────────────────────────────────────────────────

/// `POST /samples/{id}/measurements`, body `{"property":"UMIDADE","value":"5,2"}`
pub async fn attach<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Path(id): Path<Uuid>,
  Json(input): Json<NewMeasurement>,
) -> Result<impl IntoResponse, ApiError> {
  let measurement = state
    .store
    .attach_measurement(id, input)
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  Ok((StatusCode::CREATED, Json(measurement)))
}

#[derive(Debug, Deserialize)]
pub struct MeasurementBody {
  pub value: String,
  #[serde(default)]
  pub unit:  Option<String>,
}

/// `PUT /samples/{id}/measurements/{property}`, body `{"value":"5,2"}`
pub async fn upsert_measurement<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Path((id, property)): Path<(Uuid, String)>,
  Json(body): Json<MeasurementBody>,
) -> Result<Json<Measurement>, ApiError> {
  let input = NewMeasurement { property, value: body.value, unit: body.unit };
  let measurement = state
    .store
    .upsert_measurement(id, input)
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  Ok(Json(measurement))
}

/// `DELETE /measurements/{id}`
pub async fn detach<S: QcStore>(
  State(state): State<AppState<S>>,
  Lang(locale): Lang,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  state
    .store
    .detach_measurement(id)
    .await
    .map_err(|e| ApiError::store(e, locale))?;
  Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
  use axum::http::StatusCode;
  use serde_json::json;

  use crate::test_helpers::{json_body, make_state, send, submission};

  #[tokio::test]
  async fn ingest_then_fetch() {
    let state = make_state().await;
    let resp = send(&state, "POST", "/samples", Some(submission(1, "9"))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "created");
    assert_eq!(body["verdict"], "ALERT");
    assert_eq!(body["completeness"], true);
    assert_eq!(body["measurements"][0]["classification"], "ALERT");

    let id = body["sample_id"].as_str().unwrap();
    let resp = send(&state, "GET", &format!("/samples/{id}"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("etag"));
    let view = json_body(resp).await;
    assert_eq!(view["sample"]["sequence"], 1);
    assert_eq!(view["sample"]["state"], "SEALED");
  }

  #[tokio::test]
  async fn resubmission_is_idempotent_and_conflicts_on_change() {
    let state = make_state().await;
    let first = json_body(
      send(&state, "POST", "/samples", Some(submission(1, "5"))).await,
    )
    .await;

    let resp = send(&state, "POST", "/samples", Some(submission(1, "5"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let again = json_body(resp).await;
    assert_eq!(again["status"], "unchanged");
    assert_eq!(again["sample_id"], first["sample_id"]);

    let resp = send(&state, "POST", "/samples", Some(submission(1, "6"))).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(resp).await["code"], "duplicate_sample");

    let mut update = submission(1, "6");
    update["update"] = json!(true);
    let resp = send(&state, "POST", "/samples", Some(update)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "updated");
  }

  #[tokio::test]
  async fn validation_errors_carry_the_field() {
    let state = make_state().await;
    let mut body = submission(1, "5");
    body["shift"] = json!("D");
    let resp = send(&state, "POST", "/samples", Some(body)).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let err = json_body(resp).await;
    assert_eq!(err["code"], "unknown_shift");
    assert_eq!(err["field"], "shift");

    let resp = send(&state, "POST", "/samples", Some(submission(1, "5.12345"))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(resp).await["code"], "invalid_measurement");

    let resp = send(&state, "POST", "/samples", Some(submission(4, "5"))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(resp).await["code"], "invalid_sample");
  }

  #[tokio::test]
  async fn errors_follow_accept_language() {
    let state = make_state().await;
    let mut body = submission(1, "5");
    body["line"] = json!("L9");
    let req = axum::http::Request::builder()
      .method("POST")
      .uri("/samples")
      .header("content-type", "application/json")
      .header("accept-language", "pt-BR,pt;q=0.9")
      .body(axum::body::Body::from(body.to_string()))
      .unwrap();
    let resp = tower::ServiceExt::oneshot(crate::api_router(state), req)
      .await
      .unwrap();
    let err = json_body(resp).await;
    assert_eq!(err["error"], "linha de produção desconhecida: L9");
  }

  #[tokio::test]
  async fn etag_supports_conditional_get() {
    let state = make_state().await;
    let body = json_body(
      send(&state, "POST", "/samples", Some(submission(1, "5"))).await,
    )
    .await;
    let id = body["sample_id"].as_str().unwrap().to_string();

    let resp = send(&state, "GET", &format!("/samples/{id}"), None).await;
    let etag = resp.headers()["etag"].to_str().unwrap().to_string();

    let req = axum::http::Request::builder()
      .uri(format!("/samples/{id}"))
      .header("if-none-match", &etag)
      .body(axum::body::Body::empty())
      .unwrap();
    let resp = tower::ServiceExt::oneshot(crate::api_router(state.clone()), req)
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);

    let uri = format!("/samples/{id}/measurements/UMIDADE");
    send(&state, "PUT", &uri, Some(json!({ "value": "11" }))).await;
    let resp = send(&state, "GET", &format!("/samples/{id}"), None).await;
    assert_ne!(resp.headers()["etag"].to_str().unwrap(), etag);
  }

  #[tokio::test]
  async fn measurement_lifecycle() {
    let state = make_state().await;
    let mut body = submission(2, "5");
    body["measurements"] = json!([]);
    let created = json_body(send(&state, "POST", "/samples", Some(body)).await).await;
    assert_eq!(created["completeness"], false);
    assert_eq!(created["missing_required"], json!(["UMIDADE"]));
    let id = created["sample_id"].as_str().unwrap().to_string();

    let uri = format!("/samples/{id}/measurements");
    let resp = send(
      &state,
      "POST",
      &uri,
      Some(json!({ "property": "UMIDADE", "value": "10,5" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let m = json_body(resp).await;
    assert_eq!(m["classification"], "REJECTED");

    let resp = send(
      &state,
      "POST",
      &uri,
      Some(json!({ "property": "UMIDADE", "value": "5" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(resp).await["code"], "duplicate_measurement");

    let resp = send(&state, "POST", &format!("/samples/{id}/seal"), None).await;
    let view = json_body(resp).await;
    assert_eq!(view["sample"]["verdict"], "REJECTED");
    assert_eq!(view["sample"]["complete"], true);

    let mid = m["measurement_id"].as_str().unwrap();
    let resp = send(&state, "DELETE", &format!("/measurements/{mid}"), None).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = send(&state, "DELETE", &format!("/samples/{id}"), None).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = send(&state, "GET", &format!("/samples/{id}"), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["code"], "sample_not_found");
  }

  #[tokio::test]
  async fn list_filters_by_verdict() {
    let state = make_state().await;
    send(&state, "POST", "/samples", Some(submission(1, "5"))).await;
    send(&state, "POST", "/samples", Some(submission(2, "11"))).await;

    let resp = send(&state, "GET", "/samples?verdict=REJECTED", None).await;
    let list = json_body(resp).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["sequence"], 2);
  }
}
