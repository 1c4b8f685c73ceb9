//! Long-format CSV export: one line per measurement.
//!
//! The leading columns match the bulk-import header, so an export can be
//! fed back to `POST /samples/bulk`; re-importing it unchanged leaves every
//! sample untouched.

use std::io::Write;

use chrono::SecondsFormat;
use vermiqc_core::sample::SampleView;

use crate::Result;

pub const EXPORT_COLUMNS: [&str; 14] = [
  "date",
  "shift",
  "line",
  "product",
  "kind",
  "sequence",
  "property",
  "value",
  "unit",
  "operator",
  "sample_time",
  "observations",
  "classification",
  "verdict",
];

/// Write `views` to `out`. Samples without measurements have no line.
pub fn write_export<W: Write>(out: W, views: &[SampleView]) -> Result<()> {
  let mut writer = csv::Writer::from_writer(out);
  writer.write_record(EXPORT_COLUMNS)?;

  for view in views {
    let sample = &view.sample;
    let key = &sample.key;
    let date = key.date.format("%Y-%m-%d").to_string();
    let kind = key.kind.to_string();
    let sequence = key.sequence.to_string();
    let sample_time =
      sample.sample_time.to_rfc3339_opts(SecondsFormat::AutoSi, true);
    let verdict = sample.verdict.to_string();

    for m in &view.measurements {
      let value = m.value.to_string();
      let classification = m.classification.to_string();
      writer.write_record([
        date.as_str(),
        key.shift.as_str(),
        key.line.as_str(),
        key.product.as_str(),
        kind.as_str(),
        sequence.as_str(),
        m.property.as_str(),
        value.as_str(),
        m.unit.as_deref().unwrap_or_default(),
        sample.operator.as_str(),
        sample_time.as_str(),
        sample.observations.as_deref().unwrap_or_default(),
        classification.as_str(),
        verdict.as_str(),
      ])?;
    }
  }

  writer.flush()?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{parse_bulk, test_helpers::make_view};

  #[test]
  fn one_line_per_measurement() {
    let view = make_view(&[("UMIDADE", "5.00"), ("DENSIDADE", "95")]);
    let mut buf = Vec::new();
    write_export(&mut buf, &[view]).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], EXPORT_COLUMNS.join(","));
    assert_eq!(
      lines[1],
      "2024-03-14,A,L1,V-MED,POINTWISE,2,UMIDADE,5.00,,ana,\
       2024-03-14T09:30:00Z,,APPROVED,ALERT"
    );
  }

  #[test]
  fn export_reimports_as_the_same_submission() {
    let view = make_view(&[("UMIDADE", "5.00"), ("DENSIDADE", "95")]);
    let mut buf = Vec::new();
    write_export(&mut buf, std::slice::from_ref(&view)).unwrap();

    let parsed = parse_bulk(buf.as_slice()).unwrap();
    assert!(parsed.errors.is_empty());
    assert_eq!(parsed.items.len(), 1);

    let s = &parsed.items[0].submission;
    assert_eq!(s.date, view.sample.key.date);
    assert_eq!(s.sequence, Some(view.sample.key.sequence));
    assert_eq!(s.operator, view.sample.operator);
    assert_eq!(s.sample_time, Some(view.sample.sample_time));
    let values: Vec<&str> = s.measurements.iter().map(|m| m.value.as_str()).collect();
    assert_eq!(values, vec!["5.00", "95"]);
  }

  #[test]
  fn observations_survive_a_reimport() {
    let mut view = make_view(&[("UMIDADE", "5.00"), ("DENSIDADE", "95")]);
    view.sample.observations = Some("umidade ok, \"lote\" 7".into());
    let mut buf = Vec::new();
    write_export(&mut buf, std::slice::from_ref(&view)).unwrap();

    let parsed = parse_bulk(buf.as_slice()).unwrap();
    assert!(parsed.errors.is_empty());
    assert_eq!(parsed.items[0].submission.observations, view.sample.observations);
  }

  #[test]
  fn empty_samples_are_omitted() {
    let view = make_view(&[]);
    let mut buf = Vec::new();
    write_export(&mut buf, &[view]).unwrap();
    assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 1);
  }
}
