//! Submission shapes accepted by the ingest API and their validation.
//!
//! Validation runs against a [`Catalog`] snapshot taken inside the same
//! transaction that applies the submission, so a submission either applies
//! completely or not at all.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::{
  Error,
  Result,
  catalog::{Catalog, Shift},
  sample::{AnalysisKind, NewMeasurement, SampleView},
  value::MeasuredValue,
  verdict::Verdict,
};

// ─── Submission ──────────────────────────────────────────────────────────────

/// One pointwise or composite sample with its measurements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
  pub kind:                  AnalysisKind,
  pub date:                  NaiveDate,
  pub shift:                 String,
  pub line:                  String,
  pub product:               String,
  #[serde(default)]
  pub sequence:              Option<u32>,
  #[serde(default)]
  pub sample_time:           Option<DateTime<Utc>>,
  #[serde(default)]
  pub operator:              String,
  #[serde(default)]
  pub measurements:          Vec<NewMeasurement>,
  #[serde(default)]
  pub observations:          Option<String>,
  /// Replace an existing sample with the same key instead of failing.
  #[serde(default)]
  pub update:                bool,
  /// Fail with `StaleSpecification` when a property has no active spec.
  #[serde(default)]
  pub require_specification: bool,
}

/// A measurement that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMeasurement {
  pub property: String,
  pub value:    MeasuredValue,
  pub unit:     Option<String>,
}

/// A submission whose references and values have been checked.
#[derive(Debug, Clone)]
pub struct ValidatedSubmission {
  pub sequence:     Option<u32>,
  pub sample_time:  DateTime<Utc>,
  pub measurements: Vec<ParsedMeasurement>,
  pub required:     Vec<String>,
}

impl Submission {
  /// Check every reference against `catalog`, parse every value at its
  /// property's data type, and resolve the evaluation instant.
  ///
  /// An explicit `sample_time` must fall on `date` or the following day in
  /// plant time; the later day covers shifts that run past midnight.
  pub fn validate(
    &self,
    catalog: &Catalog,
    offset: FixedOffset,
  ) -> Result<ValidatedSubmission> {
    catalog.product(&self.product)?;
    catalog.line(&self.line)?;
    let shift = catalog.shift(&self.shift)?;
    let sequence = self.kind.check_sequence(self.sequence)?;

    let mut measurements: Vec<ParsedMeasurement> =
      Vec::with_capacity(self.measurements.len());
    for input in &self.measurements {
      let property = catalog.property(&input.property)?;
      if measurements.iter().any(|m| m.property == input.property) {
        return Err(Error::DuplicateMeasurement {
          sample_id: None,
          property:  input.property.clone(),
        });
      }
      let value =
        MeasuredValue::parse(&property.code, &input.value, property.data_type)?;
      measurements.push(ParsedMeasurement {
        property: property.code.clone(),
        value,
        unit: input.unit.clone().filter(|u| !u.trim().is_empty()),
      });
    }

    let sample_time =
      resolve_sample_time(self.date, self.sample_time, shift, offset)?;

    Ok(ValidatedSubmission {
      sequence,
      sample_time,
      measurements,
      required: catalog.required_properties(self.kind),
    })
  }
}

/// The evaluation instant of a sample dated `date`: `explicit` when it
/// falls on `date` or the following plant day, otherwise the shift start.
pub fn resolve_sample_time(
  date: NaiveDate,
  explicit: Option<DateTime<Utc>>,
  shift: &Shift,
  offset: FixedOffset,
) -> Result<DateTime<Utc>> {
  let Some(at) = explicit else {
    return Ok(default_sample_time(date, shift, offset));
  };
  let local = at.with_timezone(&offset).date_naive();
  if local == date || date.succ_opt() == Some(local) {
    return Ok(at);
  }
  Err(Error::InvalidSample {
    field:  "sample_time".into(),
    reason: format!("{local} is outside sample date {date}"),
  })
}

/// The shift start on `date`, read as plant-local time.
pub fn default_sample_time(
  date: NaiveDate,
  shift: &Shift,
  offset: FixedOffset,
) -> DateTime<Utc> {
  let local = date.and_time(shift.starts_at);
  match local.and_local_timezone(offset).single() {
    Some(dt) => dt.with_timezone(&Utc),
    None => local.and_utc(),
  }
}

impl ValidatedSubmission {
  /// Whether applying this submission to `existing` would change nothing.
  pub fn is_identical_to(
    &self,
    submission: &Submission,
    existing: &SampleView,
  ) -> bool {
    let sample = &existing.sample;
    let note = |o: &Option<String>| {
      o.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
    };
    if sample.operator != submission.operator
      || note(&sample.observations) != note(&submission.observations)
      || sample.sample_time != self.sample_time
      || existing.measurements.len() != self.measurements.len()
    {
      return false;
    }
    self.measurements.iter().all(|parsed| {
      existing.measurement(&parsed.property).is_some_and(|m| {
        m.value == parsed.value && m.unit == parsed.unit
      })
    })
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// What a submission did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IngestStatus {
  /// New sample created (HTTP 201).
  Created,
  /// Same key and payload as an existing sample (HTTP 200). Nothing is
  /// mutated, except that a draft still awaiting its seal is sealed.
  Unchanged,
  /// Existing sample replaced and re-sealed under update intent (HTTP 200).
  Updated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
  pub status:           IngestStatus,
  pub view:             SampleView,
  pub missing_required: Vec<String>,
}

/// One measurement line of the ingest response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
  pub property:       String,
  pub value:          String,
  pub unit:           Option<String>,
  pub classification: Verdict,
  pub unspecified:    bool,
}

/// Body returned by `POST /samples`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
  pub sample_id:        Uuid,
  pub status:           IngestStatus,
  pub verdict:          Verdict,
  pub completeness:     bool,
  pub missing_required: Vec<String>,
  pub measurements:     Vec<MeasurementResult>,
}

impl From<IngestOutcome> for IngestResponse {
  fn from(outcome: IngestOutcome) -> Self {
    let IngestOutcome { status, view, missing_required } = outcome;
    Self {
      sample_id: view.sample.sample_id,
      status,
      verdict: view.sample.verdict,
      completeness: view.sample.complete,
      missing_required,
      measurements: view
        .measurements
        .into_iter()
        .map(|m| MeasurementResult {
          property:       m.property,
          value:          m.value.to_string(),
          unit:           m.unit,
          classification: m.classification,
          unspecified:    m.unspecified,
        })
        .collect(),
    }
  }
}

// ─── Bulk ────────────────────────────────────────────────────────────────────

/// How a bulk ingest commits and reacts to errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
  /// Abort and roll back the whole batch on the first error.
  #[serde(default)]
  pub strict:         bool,
  /// Commit each sample group on its own instead of the batch as a unit.
  #[serde(default)]
  pub per_row_commit: bool,
}

/// A sample assembled from one or more input rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
  /// Input row numbers that contributed to this sample.
  pub rows:       Vec<usize>,
  pub submission: Submission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
  pub row:   usize,
  pub code:  String,
  pub error: String,
}

impl RowError {
  pub fn new(row: usize, code: impl Into<String>, error: impl Into<String>) -> Self {
    Self { row, code: code.into(), error: error.into() }
  }

  pub fn from_error(row: usize, err: &Error) -> Self {
    Self::new(row, err.code(), err.to_string())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
  pub samples_created:   usize,
  pub samples_updated:   usize,
  pub samples_unchanged: usize,
  pub rejected_samples:  Vec<Uuid>,
  pub errors:            Vec<RowError>,
  /// False when a strict batch was rolled back.
  pub committed:         bool,
}

impl BatchReport {
  pub fn record(&mut self, outcome: &IngestOutcome) {
    match outcome.status {
      IngestStatus::Created => self.samples_created += 1,
      IngestStatus::Updated => self.samples_updated += 1,
      IngestStatus::Unchanged => self.samples_unchanged += 1,
    }
    if outcome.view.sample.verdict == Verdict::Rejected {
      self.rejected_samples.push(outcome.view.sample.sample_id);
    }
  }

  /// Record `err` against every row of `item`.
  pub fn fail(&mut self, item: &BatchItem, err: &Error) {
    self
      .errors
      .extend(item.rows.iter().map(|row| RowError::from_error(*row, err)));
  }
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveTime, TimeZone, Timelike};

  use super::*;
  use crate::catalog::{DataType, Product, ProductionLine, Property};

  fn catalog() -> Catalog {
    Catalog::from_parts(
      vec![Product {
        code:          "V-MED".into(),
        name:          "Vermiculita média".into(),
        display_order: 1,
        active:        true,
      }],
      vec![
        Property {
          code:               "UMIDADE".into(),
          name:               "Umidade".into(),
          unit:               "%".into(),
          data_type:          DataType::Numeric,
          category:           "fisico".into(),
          test_method:        "estufa 105C".into(),
          display_order:      1,
          required_pointwise: true,
          required_composite: true,
        },
        Property {
          code:               "COR".into(),
          name:               "Cor".into(),
          unit:               String::new(),
          data_type:          DataType::Categorical,
          category:           "visual".into(),
          test_method:        String::new(),
          display_order:      2,
          required_pointwise: false,
          required_composite: false,
        },
      ],
      vec![ProductionLine {
        code:   "L1".into(),
        name:   "Linha 1".into(),
        active: true,
      }],
      vec![Shift {
        code:          "A".into(),
        name:          "Turno A".into(),
        starts_at:     NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        display_order: 1,
      }],
    )
  }

  fn submission() -> Submission {
    Submission {
      kind:                  AnalysisKind::Pointwise,
      date:                  NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
      shift:                 "A".into(),
      line:                  "L1".into(),
      product:               "V-MED".into(),
      sequence:              Some(2),
      sample_time:           None,
      operator:              "ana".into(),
      measurements:          vec![NewMeasurement {
        property: "UMIDADE".into(),
        value:    "5.00".into(),
        unit:     None,
      }],
      observations:          None,
      update:                false,
      require_specification: false,
    }
  }

  fn offset() -> FixedOffset { FixedOffset::west_opt(3 * 3600).unwrap() }

  #[test]
  fn valid_submission_defaults_sample_time_to_shift_start() {
    let v = submission().validate(&catalog(), offset()).unwrap();
    assert_eq!(v.sequence, Some(2));
    assert_eq!(v.measurements.len(), 1);
    assert_eq!(v.required, vec!["UMIDADE"]);
    // 06:00 at UTC-3 is 09:00 UTC.
    assert_eq!(v.sample_time.hour(), 9);
  }

  #[test]
  fn explicit_sample_time_wins() {
    let mut s = submission();
    let t = Utc.with_ymd_and_hms(2024, 3, 14, 11, 15, 0).unwrap();
    s.sample_time = Some(t);
    assert_eq!(s.validate(&catalog(), offset()).unwrap().sample_time, t);
  }

  #[test]
  fn sample_time_must_match_the_sample_date() {
    let mut s = submission();
    s.sample_time = Some(Utc.with_ymd_and_hms(2024, 3, 20, 11, 0, 0).unwrap());
    let err = s.validate(&catalog(), offset()).unwrap_err();
    assert_eq!(err.code(), "invalid_sample");
    assert_eq!(err.field().as_deref(), Some("sample_time"));

    // 01:30 UTC on the 14th is still the 13th at the plant.
    s.sample_time = Some(Utc.with_ymd_and_hms(2024, 3, 14, 1, 30, 0).unwrap());
    assert!(s.validate(&catalog(), offset()).is_err());

    // A night shift may run into the next morning.
    s.sample_time = Some(Utc.with_ymd_and_hms(2024, 3, 15, 5, 0, 0).unwrap());
    assert!(s.validate(&catalog(), offset()).is_ok());
  }

  #[test]
  fn unknown_references_are_reported() {
    let mut s = submission();
    s.line = "L9".into();
    assert_eq!(
      s.validate(&catalog(), offset()).unwrap_err().code(),
      "unknown_line"
    );

    let mut s = submission();
    s.measurements[0].property = "PH".into();
    assert_eq!(
      s.validate(&catalog(), offset()).unwrap_err().code(),
      "unknown_property"
    );
  }

  #[test]
  fn duplicate_property_in_payload() {
    let mut s = submission();
    s.measurements.push(s.measurements[0].clone());
    assert_eq!(
      s.validate(&catalog(), offset()).unwrap_err().code(),
      "duplicate_measurement"
    );
  }

  #[test]
  fn unparseable_value() {
    let mut s = submission();
    s.measurements[0].value = "cinco".into();
    let err = s.validate(&catalog(), offset()).unwrap_err();
    assert_eq!(err.code(), "invalid_measurement");
    assert_eq!(err.field().as_deref(), Some("measurements.UMIDADE"));
  }

  #[test]
  fn pointwise_sequence_out_of_range() {
    let mut s = submission();
    s.sequence = Some(4);
    assert_eq!(
      s.validate(&catalog(), offset()).unwrap_err().code(),
      "invalid_sample"
    );
  }

  #[test]
  fn submission_json_shape() {
    let json = r#"{
      "kind": "POINTWISE",
      "date": "2024-03-14",
      "shift": "A",
      "line": "L1",
      "product": "V-MED",
      "sequence": 2,
      "sample_time": "2024-03-14T09:30:00Z",
      "operator": "ana",
      "measurements": [ { "property": "UMIDADE", "value": "5.00" } ],
      "observations": "ok"
    }"#;
    let s: Submission = serde_json::from_str(json).unwrap();
    assert_eq!(s.kind, AnalysisKind::Pointwise);
    assert_eq!(s.measurements[0].value, "5.00");
    assert!(!s.update);
  }
}
