//! The sample aggregator.
//!
//! [`evaluate`] classifies every measurement of a sample and folds the
//! results into a sample verdict. It is pure; the store calls it inside the
//! transaction that persists the outcome, so two seals with no intervening
//! change produce identical output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  classify::classify,
  sample::{Measurement, SampleState, SampleView},
  specification::Specification,
  verdict::{Classification, Verdict},
};

/// Classification stamped onto one measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedMeasurement {
  pub measurement_id: Uuid,
  pub classification: Classification,
  pub spec_id:        Option<Uuid>,
}

/// Everything a seal decides about a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealOutcome {
  pub verdict:          Verdict,
  pub complete:         bool,
  /// Required properties with no measurement, in the order given.
  pub missing_required: Vec<String>,
  pub stamped:          Vec<StampedMeasurement>,
}

/// Classify `measurements` with the specification `spec_for` returns for
/// each property, and aggregate.
///
/// An empty sample is APPROVED and incomplete.
pub fn evaluate<'a, F>(
  measurements: &[Measurement],
  required: &[String],
  spec_for: F,
) -> SealOutcome
where
  F: Fn(&str) -> Option<&'a Specification>,
{
  let stamped: Vec<StampedMeasurement> = measurements
    .iter()
    .map(|m| {
      let spec = spec_for(&m.property);
      StampedMeasurement {
        measurement_id: m.measurement_id,
        classification: classify(&m.value, spec),
        spec_id:        spec.map(|s| s.spec_id),
      }
    })
    .collect();

  let verdict = Verdict::worst(stamped.iter().map(|s| s.classification.verdict));

  let missing_required: Vec<String> = required
    .iter()
    .filter(|code| !measurements.iter().any(|m| &m.property == *code))
    .cloned()
    .collect();

  SealOutcome {
    verdict,
    complete: !measurements.is_empty() && missing_required.is_empty(),
    missing_required,
    stamped,
  }
}

impl SealOutcome {
  /// Write this outcome into `view`, marking the sample sealed at `at`.
  pub fn apply_to(&self, view: &mut SampleView, at: DateTime<Utc>) {
    for stamp in &self.stamped {
      if let Some(m) = view
        .measurements
        .iter_mut()
        .find(|m| m.measurement_id == stamp.measurement_id)
      {
        m.classification = stamp.classification.verdict;
        m.unspecified = stamp.classification.unspecified;
        m.spec_id = stamp.spec_id;
      }
    }
    view.sample.verdict = self.verdict;
    view.sample.complete = self.complete;
    view.sample.state = SampleState::Sealed;
    view.sample.sealed_at = Some(at);
  }

  /// Properties that were classified without an active specification.
  pub fn unspecified<'m>(
    &self,
    measurements: &'m [Measurement],
  ) -> Vec<&'m str> {
    self
      .stamped
      .iter()
      .filter(|s| s.classification.unspecified)
      .filter_map(|s| {
        measurements
          .iter()
          .find(|m| m.measurement_id == s.measurement_id)
          .map(|m| m.property.as_str())
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::HashMap, str::FromStr};

  use chrono::TimeZone;
  use rust_decimal::Decimal;

  use super::*;
  use crate::{specification::Limits, value::MeasuredValue};

  fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap()
  }

  fn spec(property: &str, lwl: &str, uwl: &str, lsl: &str, usl: &str) -> Specification {
    let d = |s: &str| Some(Decimal::from_str(s).unwrap());
    Specification {
      spec_id:        Uuid::new_v4(),
      product:        "V-MED".into(),
      property:       property.into(),
      limits:         Limits::Numeric {
        lsl: d(lsl),
        lwl: d(lwl),
        uwl: d(uwl),
        usl: d(usl),
      },
      effective_from: at(),
      effective_to:   None,
      notes:          None,
      recorded_at:    at(),
    }
  }

  fn measurement(property: &str, value: &str) -> Measurement {
    Measurement {
      measurement_id: Uuid::new_v4(),
      sample_id:      Uuid::nil(),
      property:       property.into(),
      value:          MeasuredValue::Numeric(Decimal::from_str(value).unwrap()),
      unit:           None,
      classification: Verdict::Approved,
      unspecified:    false,
      spec_id:        None,
      recorded_at:    at(),
    }
  }

  fn specs() -> HashMap<String, Specification> {
    ["P1", "P2", "P3", "P4"]
      .into_iter()
      .map(|p| (p.to_string(), spec(p, "2", "8", "0", "10")))
      .collect()
  }

  #[test]
  fn empty_sample_is_approved_and_incomplete() {
    let specs = specs();
    let out = evaluate(&[], &[], |p| specs.get(p));
    assert_eq!(out.verdict, Verdict::Approved);
    assert!(!out.complete);
  }

  #[test]
  fn mixed_classifications_reject_the_sample() {
    let specs = specs();
    let ms = vec![
      measurement("P1", "5"),
      measurement("P2", "6"),
      measurement("P3", "1.5"),
      measurement("P4", "10.01"),
    ];
    let out = evaluate(&ms, &[], |p| specs.get(p));
    assert_eq!(out.verdict, Verdict::Rejected);
    let verdicts: Vec<Verdict> =
      out.stamped.iter().map(|s| s.classification.verdict).collect();
    assert_eq!(
      verdicts,
      vec![
        Verdict::Approved,
        Verdict::Approved,
        Verdict::Alert,
        Verdict::Rejected
      ]
    );
  }

  #[test]
  fn completeness_tracks_required_properties() {
    let specs = specs();
    let ms = vec![measurement("P1", "5")];
    let required = vec!["P1".to_string(), "P2".to_string()];
    let out = evaluate(&ms, &required, |p| specs.get(p));
    assert!(!out.complete);
    assert_eq!(out.missing_required, vec!["P2"]);

    let ms = vec![measurement("P1", "5"), measurement("P2", "5")];
    let out = evaluate(&ms, &required, |p| specs.get(p));
    assert!(out.complete);
  }

  #[test]
  fn unspecified_properties_are_reported() {
    let specs = specs();
    let ms = vec![measurement("P1", "5"), measurement("OTHER", "123")];
    let out = evaluate(&ms, &[], |p| specs.get(p));
    assert_eq!(out.verdict, Verdict::Approved);
    assert_eq!(out.unspecified(&ms), vec!["OTHER"]);
  }

  #[test]
  fn sealing_twice_is_idempotent() {
    let specs = specs();
    let ms = vec![measurement("P1", "9"), measurement("P2", "1")];
    let first = evaluate(&ms, &[], |p| specs.get(p));
    let second = evaluate(&ms, &[], |p| specs.get(p));
    assert_eq!(first, second);
  }
}
