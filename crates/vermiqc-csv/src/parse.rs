//! Bulk-import parser.
//!
//! Pipeline:
//!   CSV bytes
//!     └─ Columns::locate()   → header positions
//!          └─ parse_row()    → Row (or RowError)
//!               └─ Groups    → one Submission per sample key

use std::{collections::HashMap, io::Read, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use vermiqc_core::{
  ingest::{BatchItem, RowError, Submission},
  sample::{AnalysisKind, NewMeasurement},
};

use crate::{BulkParse, Error, Result};

// ─── Header ──────────────────────────────────────────────────────────────────

/// Columns every bulk file must carry, in canonical order.
pub const REQUIRED_COLUMNS: [&str; 8] = [
  "date", "shift", "line", "product", "kind", "sequence", "property", "value",
];

struct Columns {
  required:     [usize; 8],
  operator:     Option<usize>,
  sample_time:  Option<usize>,
  unit:         Option<usize>,
  observations: Option<usize>,
}

impl Columns {
  fn locate(headers: &csv::StringRecord) -> Result<Self> {
    let find = |name: &str| {
      headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
    };
    let mut required = [0usize; 8];
    for (slot, name) in required.iter_mut().zip(REQUIRED_COLUMNS) {
      *slot = find(name).ok_or(Error::MissingColumn(name))?;
    }
    Ok(Self {
      required,
      operator: find("operator"),
      sample_time: find("sample_time"),
      unit: find("unit"),
      observations: find("observations"),
    })
  }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Grouping key; `sequence` stays optional for composite rows that leave it
/// to the store.
#[derive(Clone, PartialEq, Eq, Hash)]
struct GroupKey {
  date:     NaiveDate,
  shift:    String,
  line:     String,
  product:  String,
  kind:     AnalysisKind,
  sequence: Option<u32>,
}

struct Row {
  line:         usize,
  key:          GroupKey,
  measurement:  NewMeasurement,
  operator:     Option<String>,
  sample_time:  Option<DateTime<Utc>>,
  observations: Option<String>,
}

fn invalid(line: usize, field: &str, reason: impl std::fmt::Display) -> RowError {
  RowError::new(line, "invalid_sample", format!("{field}: {reason}"))
}

fn parse_row(
  record: &csv::StringRecord,
  line: usize,
  cols: &Columns,
) -> Result<Row, RowError> {
  let get = |i: usize| record.get(i).map(str::trim).unwrap_or_default();
  let optional = |i: Option<usize>| {
    i.map(get).filter(|s| !s.is_empty()).map(str::to_owned)
  };
  let [date, shift, line_code, product, kind, sequence, property, value] =
    cols.required.map(get);

  let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
    .map_err(|e| invalid(line, "date", e))?;
  let kind = AnalysisKind::from_str(kind)
    .map_err(|_| invalid(line, "kind", format!("unknown kind {kind:?}")))?;
  let sequence = match sequence {
    "" => None,
    s => Some(
      s.parse::<u32>()
        .map_err(|e| invalid(line, "sequence", e))?,
    ),
  };
  for (field, v) in [
    ("shift", shift),
    ("line", line_code),
    ("product", product),
    ("property", property),
  ] {
    if v.is_empty() {
      return Err(invalid(line, field, "must not be empty"));
    }
  }
  let sample_time = optional(cols.sample_time)
    .map(|s| {
      DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid(line, "sample_time", e))
    })
    .transpose()?;

  Ok(Row {
    line,
    key: GroupKey {
      date,
      shift: shift.to_owned(),
      line: line_code.to_owned(),
      product: product.to_owned(),
      kind,
      sequence,
    },
    measurement: NewMeasurement {
      property: property.to_owned(),
      value:    value.to_owned(),
      unit:     optional(cols.unit),
    },
    operator: optional(cols.operator),
    sample_time,
    observations: optional(cols.observations),
  })
}

// ─── Grouping ────────────────────────────────────────────────────────────────

/// Groups in order of first appearance.
#[derive(Default)]
struct Groups {
  index: HashMap<GroupKey, usize>,
  items: Vec<BatchItem>,
}

impl Groups {
  fn push(&mut self, row: Row) -> Result<(), RowError> {
    let Some(&i) = self.index.get(&row.key) else {
      let key = row.key;
      self.index.insert(key.clone(), self.items.len());
      self.items.push(BatchItem {
        rows:       vec![row.line],
        submission: Submission {
          kind:                  key.kind,
          date:                  key.date,
          shift:                 key.shift,
          line:                  key.line,
          product:               key.product,
          sequence:              key.sequence,
          sample_time:           row.sample_time,
          operator:              row.operator.unwrap_or_default(),
          measurements:          vec![row.measurement],
          observations:          row.observations,
          update:                false,
          require_specification: false,
        },
      });
      return Ok(());
    };

    let item = &mut self.items[i];
    let submission = &mut item.submission;
    if let Some(op) = row.operator {
      if submission.operator.is_empty() {
        submission.operator = op;
      } else if submission.operator != op {
        return Err(invalid(row.line, "operator", "differs within the sample"));
      }
    }
    if let Some(at) = row.sample_time {
      match submission.sample_time {
        None => submission.sample_time = Some(at),
        Some(prev) if prev != at => {
          return Err(invalid(row.line, "sample_time", "differs within the sample"));
        }
        Some(_) => {}
      }
    }
    if let Some(text) = row.observations {
      match &submission.observations {
        None => submission.observations = Some(text),
        Some(prev) if *prev != text => {
          return Err(invalid(row.line, "observations", "differs within the sample"));
        }
        Some(_) => {}
      }
    }
    submission.measurements.push(row.measurement);
    item.rows.push(row.line);
    Ok(())
  }
}

/// Parse a bulk file and group its rows into one submission per sample
/// key. Header problems and unreadable input are errors; row problems are
/// collected in [`BulkParse::errors`] with their 1-based file line.
pub fn parse_bulk<R: Read>(input: R) -> Result<BulkParse> {
  let mut reader = csv::ReaderBuilder::new()
    .trim(csv::Trim::Headers)
    .flexible(true)
    .from_reader(input);
  let cols = Columns::locate(reader.headers()?)?;

  let mut groups = Groups::default();
  let mut errors = Vec::new();
  for record in reader.records() {
    let record = match record {
      Ok(record) => record,
      Err(e) => {
        let line = e.position().map_or(0, |p| p.line() as usize);
        errors.push(RowError::new(line, "invalid_csv", e.to_string()));
        continue;
      }
    };
    let line = record.position().map_or(0, |p| p.line() as usize);
    if record.iter().all(|f| f.trim().is_empty()) {
      continue;
    }
    let pushed = parse_row(&record, line, &cols).and_then(|row| groups.push(row));
    if let Err(e) = pushed {
      errors.push(e);
    }
  }

  Ok(BulkParse { items: groups.items, errors })
}
