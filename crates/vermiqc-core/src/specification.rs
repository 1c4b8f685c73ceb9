//! Specification limits per `(product, property)` with effective dating.
//!
//! History is append-only: an upsert closes the previously active row by
//! setting its `effective_to` and inserts a new row. Lookups at an instant
//! are range lookups over `[effective_from, effective_to)`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, catalog::DataType, value::check_precision};

// ─── Limits ──────────────────────────────────────────────────────────────────

/// Acceptance limits. Numeric bounds are all optional; a missing bound never
/// triggers its band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Limits {
  Numeric {
    /// Lower specification limit; below it the value is rejected.
    #[serde(default)]
    lsl: Option<Decimal>,
    /// Lower warning limit; below it (but within spec) the value alerts.
    #[serde(default)]
    lwl: Option<Decimal>,
    #[serde(default)]
    uwl: Option<Decimal>,
    #[serde(default)]
    usl: Option<Decimal>,
  },
  Categorical {
    accepted: BTreeSet<String>,
  },
}

impl Limits {
  pub fn data_type(&self) -> DataType {
    match self {
      Self::Numeric { .. } => DataType::Numeric,
      Self::Categorical { .. } => DataType::Categorical,
    }
  }

  /// Check `lsl ≤ lwl ≤ uwl ≤ usl` over the bounds that are present, and
  /// that every bound fits the measurement precision.
  pub fn validate(&self) -> Result<()> {
    match self {
      Self::Numeric { lsl, lwl, uwl, usl } => {
        let named = [("lsl", lsl), ("lwl", lwl), ("uwl", uwl), ("usl", usl)];
        let present: Vec<(&str, Decimal)> = named
          .iter()
          .filter_map(|(name, bound)| bound.map(|b| (*name, b)))
          .collect();

        for (name, bound) in &present {
          check_precision(*bound).map_err(|_| {
            Error::InvalidBounds(format!("{name} has too many fractional digits"))
          })?;
        }
        for pair in present.windows(2) {
          let ((lo_name, lo), (hi_name, hi)) = (pair[0], pair[1]);
          if lo > hi {
            return Err(Error::InvalidBounds(format!(
              "{lo_name} ({lo}) is greater than {hi_name} ({hi})"
            )));
          }
        }
        Ok(())
      }
      Self::Categorical { accepted } => {
        if accepted.iter().any(|t| t.trim().is_empty()) {
          return Err(Error::InvalidBounds(
            "accepted tokens must not be blank".into(),
          ));
        }
        Ok(())
      }
    }
  }
}

// ─── Specification ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
  pub spec_id:        Uuid,
  pub product:        String,
  pub property:       String,
  pub limits:         Limits,
  pub effective_from: DateTime<Utc>,
  /// `None` while the specification is the active one.
  pub effective_to:   Option<DateTime<Utc>>,
  pub notes:          Option<String>,
  pub recorded_at:    DateTime<Utc>,
}

impl Specification {
  /// Whether `at` falls inside `[effective_from, effective_to)`.
  pub fn covers(&self, at: DateTime<Utc>) -> bool {
    self.effective_from <= at && self.effective_to.is_none_or(|to| at < to)
  }
}

/// Pick the specification covering `at` from one pair's history.
pub fn active_at(
  history: &[Specification],
  at: DateTime<Utc>,
) -> Option<&Specification> {
  history.iter().find(|s| s.covers(at))
}

// ─── NewSpecification ────────────────────────────────────────────────────────

/// Input to [`crate::store::QcStore::upsert_specification`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSpecification {
  pub product:        String,
  pub property:       String,
  pub limits:         Limits,
  /// Defaults to the time of the upsert.
  #[serde(default)]
  pub effective_from: Option<DateTime<Utc>>,
  #[serde(default)]
  pub notes:          Option<String>,
}

impl NewSpecification {
  /// Validate the limits against the property's data type.
  pub fn validate(&self, data_type: DataType) -> Result<()> {
    if self.limits.data_type() != data_type {
      return Err(Error::InvalidBounds(format!(
        "{} limits given for {data_type} property {}",
        self.limits.data_type(),
        self.property
      )));
    }
    self.limits.validate()
  }
}
