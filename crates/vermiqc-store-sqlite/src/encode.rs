//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that SQL string comparison orders them
//! correctly. Dates are `YYYY-MM-DD`. Decimals keep their scale as written.
//! Enums use their `strum` spelling. Specification limits are compact JSON.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use vermiqc_core::{
  catalog::{DataType, Product, ProductionLine, Property, Shift},
  sample::{Measurement, Sample, SampleKey},
  specification::{Limits, Specification},
  value::MeasuredValue,
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

pub fn encode_time(t: NaiveTime) -> String { t.format("%H:%M:%S").to_string() }

pub fn decode_time(s: &str) -> Result<NaiveTime> {
  NaiveTime::parse_from_str(s, "%H:%M:%S")
    .map_err(|e| Error::Decode(format!("time {s:?}: {e}")))
}

/// Parse a `strum`-spelled enum column.
pub fn decode_enum<T: FromStr>(column: &str, s: &str) -> Result<T> {
  T::from_str(s).map_err(|_| Error::Decode(format!("unknown {column}: {s:?}")))
}

// ─── Values and limits ───────────────────────────────────────────────────────

/// Split a measured value into its `(value_type, value)` columns.
pub fn encode_value(value: &MeasuredValue) -> (String, String) {
  (value.data_type().to_string(), value.to_string())
}

pub fn decode_value(value_type: &str, value: &str) -> Result<MeasuredValue> {
  match decode_enum::<DataType>("value type", value_type)? {
    DataType::Numeric => Decimal::from_str(value)
      .map(MeasuredValue::Numeric)
      .map_err(|e| Error::Decode(format!("decimal {value:?}: {e}"))),
    DataType::Categorical => Ok(MeasuredValue::Categorical(value.to_owned())),
  }
}

pub fn encode_limits(limits: &Limits) -> Result<String> {
  Ok(serde_json::to_string(limits)?)
}

pub fn decode_limits(s: &str) -> Result<Limits> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const PRODUCT_COLUMNS: &str = "code, name, display_order, active";

pub fn product_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
  Ok(Product {
    code:          row.get(0)?,
    name:          row.get(1)?,
    display_order: row.get(2)?,
    active:        row.get(3)?,
  })
}

pub const LINE_COLUMNS: &str = "code, name, active";

pub fn line_from_row(
  row: &rusqlite::Row<'_>,
) -> rusqlite::Result<ProductionLine> {
  Ok(ProductionLine {
    code:   row.get(0)?,
    name:   row.get(1)?,
    active: row.get(2)?,
  })
}

pub const PROPERTY_COLUMNS: &str = "code, name, unit, data_type, category, \
                                    test_method, display_order, \
                                    required_pointwise, required_composite";

/// Raw strings read directly from a `properties` row.
pub struct RawProperty {
  pub code:               String,
  pub name:               String,
  pub unit:               String,
  pub data_type:          String,
  pub category:           String,
  pub test_method:        String,
  pub display_order:      i32,
  pub required_pointwise: bool,
  pub required_composite: bool,
}

impl RawProperty {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      code:               row.get(0)?,
      name:               row.get(1)?,
      unit:               row.get(2)?,
      data_type:          row.get(3)?,
      category:           row.get(4)?,
      test_method:        row.get(5)?,
      display_order:      row.get(6)?,
      required_pointwise: row.get(7)?,
      required_composite: row.get(8)?,
    })
  }

  pub fn into_property(self) -> Result<Property> {
    Ok(Property {
      data_type:          decode_enum("data type", &self.data_type)?,
      code:               self.code,
      name:               self.name,
      unit:               self.unit,
      category:           self.category,
      test_method:        self.test_method,
      display_order:      self.display_order,
      required_pointwise: self.required_pointwise,
      required_composite: self.required_composite,
    })
  }
}

pub const SHIFT_COLUMNS: &str = "code, name, starts_at, display_order";

pub struct RawShift {
  pub code:          String,
  pub name:          String,
  pub starts_at:     String,
  pub display_order: i32,
}

impl RawShift {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      code:          row.get(0)?,
      name:          row.get(1)?,
      starts_at:     row.get(2)?,
      display_order: row.get(3)?,
    })
  }

  pub fn into_shift(self) -> Result<Shift> {
    Ok(Shift {
      starts_at:     decode_time(&self.starts_at)?,
      code:          self.code,
      name:          self.name,
      display_order: self.display_order,
    })
  }
}

pub const SPECIFICATION_COLUMNS: &str = "spec_id, product, property, \
                                         limits_json, effective_from, \
                                         effective_to, notes, recorded_at";

/// Raw strings read directly from a `specifications` row.
pub struct RawSpecification {
  pub spec_id:        String,
  pub product:        String,
  pub property:       String,
  pub limits_json:    String,
  pub effective_from: String,
  pub effective_to:   Option<String>,
  pub notes:          Option<String>,
  pub recorded_at:    String,
}

impl RawSpecification {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      spec_id:        row.get(0)?,
      product:        row.get(1)?,
      property:       row.get(2)?,
      limits_json:    row.get(3)?,
      effective_from: row.get(4)?,
      effective_to:   row.get(5)?,
      notes:          row.get(6)?,
      recorded_at:    row.get(7)?,
    })
  }

  pub fn into_specification(self) -> Result<Specification> {
    Ok(Specification {
      spec_id:        decode_uuid(&self.spec_id)?,
      product:        self.product,
      property:       self.property,
      limits:         decode_limits(&self.limits_json)?,
      effective_from: decode_dt(&self.effective_from)?,
      effective_to:   self.effective_to.as_deref().map(decode_dt).transpose()?,
      notes:          self.notes,
      recorded_at:    decode_dt(&self.recorded_at)?,
    })
  }
}

pub const SAMPLE_COLUMNS: &str = "sample_id, date, shift, line, product, \
                                  kind, sequence, sample_time, operator, \
                                  observations, state, verdict, complete, \
                                  created_at, updated_at, sealed_at";

/// Raw strings read directly from a `samples` row.
pub struct RawSample {
  pub sample_id:    String,
  pub date:         String,
  pub shift:        String,
  pub line:         String,
  pub product:      String,
  pub kind:         String,
  pub sequence:     u32,
  pub sample_time:  String,
  pub operator:     String,
  pub observations: Option<String>,
  pub state:        String,
  pub verdict:      String,
  pub complete:     bool,
  pub created_at:   String,
  pub updated_at:   String,
  pub sealed_at:    Option<String>,
}

impl RawSample {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sample_id:    row.get(0)?,
      date:         row.get(1)?,
      shift:        row.get(2)?,
      line:         row.get(3)?,
      product:      row.get(4)?,
      kind:         row.get(5)?,
      sequence:     row.get(6)?,
      sample_time:  row.get(7)?,
      operator:     row.get(8)?,
      observations: row.get(9)?,
      state:        row.get(10)?,
      verdict:      row.get(11)?,
      complete:     row.get(12)?,
      created_at:   row.get(13)?,
      updated_at:   row.get(14)?,
      sealed_at:    row.get(15)?,
    })
  }

  pub fn into_sample(self) -> Result<Sample> {
    Ok(Sample {
      sample_id:    decode_uuid(&self.sample_id)?,
      key:          SampleKey {
        date:     decode_date(&self.date)?,
        shift:    self.shift,
        line:     self.line,
        product:  self.product,
        kind:     decode_enum("analysis kind", &self.kind)?,
        sequence: self.sequence,
      },
      sample_time:  decode_dt(&self.sample_time)?,
      operator:     self.operator,
      observations: self.observations,
      state:        decode_enum("sample state", &self.state)?,
      verdict:      decode_enum("verdict", &self.verdict)?,
      complete:     self.complete,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
      sealed_at:    self.sealed_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

pub const MEASUREMENT_COLUMNS: &str = "measurement_id, sample_id, property, \
                                       value_type, value, unit, \
                                       classification, unspecified, spec_id, \
                                       recorded_at";

/// Raw strings read directly from a `measurements` row.
pub struct RawMeasurement {
  pub measurement_id: String,
  pub sample_id:      String,
  pub property:       String,
  pub value_type:     String,
  pub value:          String,
  pub unit:           Option<String>,
  pub classification: String,
  pub unspecified:    bool,
  pub spec_id:        Option<String>,
  pub recorded_at:    String,
}

impl RawMeasurement {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      measurement_id: row.get(0)?,
      sample_id:      row.get(1)?,
      property:       row.get(2)?,
      value_type:     row.get(3)?,
      value:          row.get(4)?,
      unit:           row.get(5)?,
      classification: row.get(6)?,
      unspecified:    row.get(7)?,
      spec_id:        row.get(8)?,
      recorded_at:    row.get(9)?,
    })
  }

  pub fn into_measurement(self) -> Result<Measurement> {
    Ok(Measurement {
      measurement_id: decode_uuid(&self.measurement_id)?,
      sample_id:      decode_uuid(&self.sample_id)?,
      value:          decode_value(&self.value_type, &self.value)?,
      property:       self.property,
      unit:           self.unit,
      classification: decode_enum("classification", &self.classification)?,
      unspecified:    self.unspecified,
      spec_id:        self.spec_id.as_deref().map(decode_uuid).transpose()?,
      recorded_at:    decode_dt(&self.recorded_at)?,
    })
  }
}
