//! The classifier: one measured value against one specification.
//!
//! Bands are closed on the inside: a value equal to `lsl` is not rejected and
//! a value equal to `lwl` does not alert.

use rust_decimal::Decimal;

use crate::{
  specification::{Limits, Specification},
  value::MeasuredValue,
  verdict::{Classification, Verdict},
};

/// Classify `value` against `spec`. A missing specification yields
/// APPROVED flagged as unspecified, as does a value whose kind does not match
/// the limits.
pub fn classify(
  value: &MeasuredValue,
  spec: Option<&Specification>,
) -> Classification {
  match spec {
    Some(spec) => classify_limits(value, &spec.limits),
    None => Classification::unspecified(),
  }
}

pub fn classify_limits(value: &MeasuredValue, limits: &Limits) -> Classification {
  match (value, limits) {
    (MeasuredValue::Numeric(v), Limits::Numeric { lsl, lwl, uwl, usl }) => {
      let below = |bound: &Option<Decimal>| bound.is_some_and(|b| *v < b);
      let above = |bound: &Option<Decimal>| bound.is_some_and(|b| *v > b);

      let verdict = if below(lsl) || above(usl) {
        Verdict::Rejected
      } else if below(lwl) || above(uwl) {
        Verdict::Alert
      } else {
        Verdict::Approved
      };
      Classification::specified(verdict)
    }
    (MeasuredValue::Categorical(token), Limits::Categorical { accepted }) => {
      let verdict = if accepted.contains(token) {
        Verdict::Approved
      } else {
        Verdict::Rejected
      };
      Classification::specified(verdict)
    }
    _ => Classification::unspecified(),
  }
}
