//! The verdict lattice: APPROVED < ALERT < REJECTED.
//!
//! Sample-level aggregation is `max` over this order, which makes it total,
//! associative, and independent of measurement order.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Outcome of checking a value (or a whole sample) against specification
/// limits. Variants are declared in lattice order; `Ord` follows it.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Verdict {
  #[default]
  Approved,
  Alert,
  Rejected,
}

impl Verdict {
  /// Join on the lattice. An empty iterator yields [`Verdict::Approved`].
  pub fn worst<I>(verdicts: I) -> Self
  where
    I: IntoIterator<Item = Verdict>,
  {
    verdicts.into_iter().max().unwrap_or_default()
  }
}

/// The classifier's result for a single measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
  pub verdict:     Verdict,
  /// No specification was active for the measured property; the verdict
  /// defaults to APPROVED but dashboards report it separately.
  pub unspecified: bool,
}

impl Classification {
  pub fn specified(verdict: Verdict) -> Self {
    Self { verdict, unspecified: false }
  }

  pub fn unspecified() -> Self {
    Self { verdict: Verdict::Approved, unspecified: true }
  }
}
