//! Samples and their measurements.
//!
//! A sample is one physical sampling event identified by its grouping key
//! `(date, shift, line, product, kind, sequence)`. It owns at most one
//! measurement per property; the measurements are child rows, never folded
//! into the sample.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, value::MeasuredValue, verdict::Verdict};

/// Plant policy: at most three pointwise samples per shift and line.
pub const POINTWISE_MAX_SEQUENCE: u32 = 3;

// ─── Kind and state ──────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AnalysisKind {
  /// Taken directly from the production flow.
  Pointwise,
  /// A 12-hour aggregate.
  Composite,
}

impl AnalysisKind {
  /// Check a caller-supplied sequence number. Pointwise samples must carry
  /// one in `1..=3`; composite samples may omit it to have one allocated.
  pub fn check_sequence(self, sequence: Option<u32>) -> Result<Option<u32>> {
    let invalid = |reason: &str| Error::InvalidSample {
      field:  "sequence".into(),
      reason: reason.into(),
    };
    match (self, sequence) {
      (_, Some(0)) => Err(invalid("sequence starts at 1")),
      (Self::Pointwise, None) => {
        Err(invalid("pointwise samples require a sequence"))
      }
      (Self::Pointwise, Some(n)) if n > POINTWISE_MAX_SEQUENCE => Err(invalid(
        &format!("pointwise sequence must be 1..={POINTWISE_MAX_SEQUENCE}"),
      )),
      (_, seq) => Ok(seq),
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SampleState {
  /// Created, verdict not yet stamped.
  Draft,
  /// Verdict stamped by the aggregator; reflects the current measurements.
  Sealed,
}

// ─── Key ─────────────────────────────────────────────────────────────────────

/// The grouping key; unique across samples.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleKey {
  pub date:     NaiveDate,
  pub shift:    String,
  pub line:     String,
  pub product:  String,
  pub kind:     AnalysisKind,
  pub sequence: u32,
}

impl fmt::Display for SampleKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}/{}/{}/{}/{}/{}",
      self.date, self.shift, self.line, self.product, self.kind, self.sequence
    )
  }
}

// ─── Entities ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
  pub sample_id:    Uuid,
  #[serde(flatten)]
  pub key:          SampleKey,
  /// Declared sampling instant; specifications are evaluated at this time.
  pub sample_time:  DateTime<Utc>,
  pub operator:     String,
  pub observations: Option<String>,
  pub state:        SampleState,
  pub verdict:      Verdict,
  /// Non-empty and carrying every property required for its kind.
  pub complete:     bool,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
  pub sealed_at:    Option<DateTime<Utc>>,
}

impl Sample {
  pub fn is_sealed(&self) -> bool { self.state == SampleState::Sealed }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
  pub measurement_id: Uuid,
  pub sample_id:      Uuid,
  pub property:       String,
  pub value:          MeasuredValue,
  /// Overrides the property's unit when set.
  pub unit:           Option<String>,
  pub classification: Verdict,
  pub unspecified:    bool,
  /// The specification the classification was computed against.
  pub spec_id:        Option<Uuid>,
  pub recorded_at:    DateTime<Utc>,
}

/// A sample together with its measurements, ordered by property code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleView {
  pub sample:       Sample,
  pub measurements: Vec<Measurement>,
}

impl SampleView {
  pub fn measurement(&self, property: &str) -> Option<&Measurement> {
    self.measurements.iter().find(|m| m.property == property)
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::QcStore::create_sample`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSample {
  pub date:         NaiveDate,
  pub shift:        String,
  pub line:         String,
  pub product:      String,
  pub kind:         AnalysisKind,
  /// Allocated by the store for composite samples when omitted.
  #[serde(default)]
  pub sequence:     Option<u32>,
  /// Defaults to the shift start on `date` in the plant's time zone.
  #[serde(default)]
  pub sample_time:  Option<DateTime<Utc>>,
  #[serde(default)]
  pub operator:     String,
  #[serde(default)]
  pub observations: Option<String>,
}

/// A raw measurement as entered; parsed at the property's data type by the
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMeasurement {
  pub property: String,
  pub value:    String,
  #[serde(default)]
  pub unit:     Option<String>,
}

// ─── Filter ──────────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::QcStore::list_samples`]. Dates are a
/// half-open window `[date_from, date_to)` over the declared sample date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleFilter {
  pub date_from: Option<NaiveDate>,
  pub date_to:   Option<NaiveDate>,
  pub line:      Option<String>,
  pub product:   Option<String>,
  pub shift:     Option<String>,
  pub kind:      Option<AnalysisKind>,
  pub verdict:   Option<Verdict>,
  pub limit:     Option<usize>,
  pub offset:    Option<usize>,
}
