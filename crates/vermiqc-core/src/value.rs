//! Measured values and their parsing rules.
//!
//! Numeric values are fixed-point decimals with at most
//! [`MAX_FRACTION_DIGITS`] fractional digits; they are never converted to
//! binary floating point.

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, catalog::DataType};

/// Largest number of fractional digits a numeric measurement may carry.
pub const MAX_FRACTION_DIGITS: u32 = 4;

/// A value recorded for one property of a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MeasuredValue {
  Numeric(Decimal),
  Categorical(String),
}

impl MeasuredValue {
  /// Parse a raw operator-entered string at the property's data type.
  ///
  /// Numeric input accepts a comma as the decimal separator when no dot is
  /// present ("5,25"). Categorical input is trimmed and must be non-empty.
  pub fn parse(property: &str, raw: &str, data_type: DataType) -> Result<Self> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| Error::InvalidMeasurement {
      property: property.to_owned(),
      value:    raw.to_owned(),
      reason:   reason.to_owned(),
    };

    if trimmed.is_empty() {
      return Err(invalid("empty value"));
    }

    match data_type {
      DataType::Categorical => Ok(Self::Categorical(trimmed.to_owned())),
      DataType::Numeric => {
        let normalised = if trimmed.contains('.') {
          trimmed.to_owned()
        } else {
          trimmed.replacen(',', ".", 1)
        };
        let value = Decimal::from_str(&normalised)
          .map_err(|_| invalid("not a decimal number"))?;
        check_precision(value).map_err(|_| {
          invalid(&format!(
            "more than {MAX_FRACTION_DIGITS} fractional digits"
          ))
        })?;
        Ok(Self::Numeric(value))
      }
    }
  }

  pub fn data_type(&self) -> DataType {
    match self {
      Self::Numeric(_) => DataType::Numeric,
      Self::Categorical(_) => DataType::Categorical,
    }
  }

  pub fn as_decimal(&self) -> Option<Decimal> {
    match self {
      Self::Numeric(d) => Some(*d),
      Self::Categorical(_) => None,
    }
  }
}

impl fmt::Display for MeasuredValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Numeric(d) => write!(f, "{d}"),
      Self::Categorical(s) => f.write_str(s),
    }
  }
}

/// Reject decimals whose significant fractional digits exceed
/// [`MAX_FRACTION_DIGITS`]. Trailing zeros do not count ("1.50000" is fine).
pub fn check_precision(value: Decimal) -> std::result::Result<(), Decimal> {
  if value.normalize().scale() > MAX_FRACTION_DIGITS {
    Err(value)
  } else {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use rust_decimal::Decimal;

  use super::*;

  fn dec(s: &str) -> Decimal { Decimal::from_str(s).unwrap() }

  #[test]
  fn parses_numeric_with_dot_or_comma() {
    let v = MeasuredValue::parse("UMIDADE", " 5.25 ", DataType::Numeric);
    assert_eq!(v.unwrap(), MeasuredValue::Numeric(dec("5.25")));

    let v = MeasuredValue::parse("UMIDADE", "5,25", DataType::Numeric);
    assert_eq!(v.unwrap(), MeasuredValue::Numeric(dec("5.25")));
  }

  #[test]
  fn rejects_excess_precision() {
    let err =
      MeasuredValue::parse("UMIDADE", "1.00001", DataType::Numeric).unwrap_err();
    assert_eq!(err.code(), "invalid_measurement");

    assert!(MeasuredValue::parse("UMIDADE", "1.0001", DataType::Numeric).is_ok());
    assert!(
      MeasuredValue::parse("UMIDADE", "1.500000", DataType::Numeric).is_ok()
    );
  }

  #[test]
  fn rejects_garbage_and_empty() {
    assert!(MeasuredValue::parse("UMIDADE", "abc", DataType::Numeric).is_err());
    assert!(MeasuredValue::parse("UMIDADE", "  ", DataType::Numeric).is_err());
    assert!(MeasuredValue::parse("COR", "", DataType::Categorical).is_err());
  }

  #[test]
  fn categorical_is_trimmed() {
    let v = MeasuredValue::parse("COR", " DOURADA ", DataType::Categorical);
    assert_eq!(v.unwrap(), MeasuredValue::Categorical("DOURADA".into()));
  }
}
