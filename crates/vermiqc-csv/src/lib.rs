//! CSV codec for vermiqc bulk import and export.
//!
//! Converts between CSV files and [`vermiqc_core`] ingest types. Pure
//! synchronous; no HTTP or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use vermiqc_csv::parse_bulk;
//!
//! let csv = "date,shift,line,product,kind,sequence,property,value\n\
//!            2024-03-14,A,L1,V-MED,POINTWISE,1,UMIDADE,5.00\n";
//! let parsed = parse_bulk(csv.as_bytes()).unwrap();
//! println!("{} samples, {} row errors", parsed.items.len(), parsed.errors.len());
//! ```

pub mod error;
mod parse;
mod serialize;

pub use error::{Error, Result};
pub use parse::{REQUIRED_COLUMNS, parse_bulk};
pub use serialize::{EXPORT_COLUMNS, write_export};
use vermiqc_core::ingest::{BatchItem, RowError};

/// The result of parsing a bulk file.
#[derive(Debug, Default)]
pub struct BulkParse {
  /// One item per sample key, in order of first appearance.
  pub items:  Vec<BatchItem>,
  /// Rows that could not be read, by 1-based file line.
  pub errors: Vec<RowError>,
}

// ─── Shared test helpers ──────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_helpers {
  use std::str::FromStr;

  use chrono::{NaiveDate, TimeZone, Utc};
  use rust_decimal::Decimal;
  use uuid::Uuid;
  use vermiqc_core::{
    sample::{
      AnalysisKind, Measurement, Sample, SampleKey, SampleState, SampleView,
    },
    value::MeasuredValue,
    verdict::Verdict,
  };

  /// Build a sealed pointwise [`SampleView`] from `(property, value)` pairs.
  pub(crate) fn make_view(values: &[(&str, &str)]) -> SampleView {
    let sample_id = Uuid::new_v4();
    let at = Utc.with_ymd_and_hms(2024, 3, 14, 9, 30, 0).unwrap();
    let sample = Sample {
      sample_id,
      key: SampleKey {
        date:     NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
        shift:    "A".into(),
        line:     "L1".into(),
        product:  "V-MED".into(),
        kind:     AnalysisKind::Pointwise,
        sequence: 2,
      },
      sample_time: at,
      operator: "ana".into(),
      observations: None,
      state: SampleState::Sealed,
      verdict: Verdict::Alert,
      complete: true,
      created_at: at,
      updated_at: at,
      sealed_at: Some(at),
    };
    let measurements = values
      .iter()
      .map(|(property, value)| Measurement {
        measurement_id: Uuid::new_v4(),
        sample_id,
        property: (*property).into(),
        value: MeasuredValue::Numeric(Decimal::from_str(value).unwrap()),
        unit: None,
        classification: Verdict::Approved,
        unspecified: false,
        spec_id: None,
        recorded_at: at,
      })
      .collect();
    SampleView { sample, measurements }
  }
}
