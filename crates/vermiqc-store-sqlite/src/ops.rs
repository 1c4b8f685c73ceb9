//! Synchronous store operations over a borrowed connection.
//!
//! Every function here runs on the connection thread inside a
//! `tokio_rusqlite` closure. Callers pass a `Transaction` or `Savepoint`
//! (both deref to `Connection`) when the operation must be atomic with its
//! neighbours; the functions themselves never begin or commit.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, SubsecRound as _, Utc};
use rusqlite::{Connection, OptionalExtension as _, params, types::Value};
use uuid::Uuid;

use vermiqc_core::{
  catalog::{Catalog, Product, ProductionLine, Property, Shift},
  dashboard::DashboardQuery,
  ingest::{
    IngestOutcome, IngestStatus, ParsedMeasurement, Submission,
    resolve_sample_time,
  },
  sample::{
    AnalysisKind, Measurement, NewMeasurement, NewSample, Sample, SampleFilter,
    SampleKey, SampleState, SampleView,
  },
  seal::{SealOutcome, evaluate},
  specification::{NewSpecification, Specification},
  value::MeasuredValue,
  verdict::Verdict,
};

use crate::{
  Result,
  cache::SpecCache,
  encode::{
    LINE_COLUMNS, MEASUREMENT_COLUMNS, PRODUCT_COLUMNS, PROPERTY_COLUMNS,
    RawMeasurement, RawProperty, RawSample, RawShift, RawSpecification,
    SAMPLE_COLUMNS, SHIFT_COLUMNS, SPECIFICATION_COLUMNS, decode_uuid, encode_date,
    encode_dt, encode_limits, encode_time, encode_uuid, encode_value,
    line_from_row, product_from_row,
  },
};

/// Settings every operation that classifies or defaults times needs.
pub struct Ctx<'a> {
  pub cache:  &'a SpecCache,
  pub offset: FixedOffset,
  pub now:    DateTime<Utc>,
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

pub fn load_catalog(conn: &Connection) -> Result<Catalog> {
  let products = conn
    .prepare(&format!("SELECT {PRODUCT_COLUMNS} FROM products"))?
    .query_map([], product_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let properties = conn
    .prepare(&format!("SELECT {PROPERTY_COLUMNS} FROM properties"))?
    .query_map([], RawProperty::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawProperty::into_property)
    .collect::<Result<Vec<_>>>()?;

  let lines = conn
    .prepare(&format!("SELECT {LINE_COLUMNS} FROM lines"))?
    .query_map([], line_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let shifts = conn
    .prepare(&format!("SELECT {SHIFT_COLUMNS} FROM shifts"))?
    .query_map([], RawShift::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawShift::into_shift)
    .collect::<Result<Vec<_>>>()?;

  Ok(Catalog::from_parts(products, properties, lines, shifts))
}

pub fn upsert_product(conn: &Connection, p: &Product) -> Result<()> {
  conn.execute(
    "INSERT INTO products (code, name, display_order, active)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(code) DO UPDATE SET
       name = excluded.name,
       display_order = excluded.display_order,
       active = excluded.active",
    params![p.code, p.name, p.display_order, p.active],
  )?;
  Ok(())
}

/// Insert or update a property. The data type of an existing property is
/// never changed; stored values and limits depend on it.
pub fn upsert_property(conn: &Connection, p: &Property) -> Result<Property> {
  conn.execute(
    "INSERT INTO properties (
       code, name, unit, data_type, category, test_method, display_order,
       required_pointwise, required_composite
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
     ON CONFLICT(code) DO UPDATE SET
       name = excluded.name,
       unit = excluded.unit,
       category = excluded.category,
       test_method = excluded.test_method,
       display_order = excluded.display_order,
       required_pointwise = excluded.required_pointwise,
       required_composite = excluded.required_composite",
    params![
      p.code,
      p.name,
      p.unit,
      p.data_type.to_string(),
      p.category,
      p.test_method,
      p.display_order,
      p.required_pointwise,
      p.required_composite,
    ],
  )?;
  let raw = conn.query_row(
    &format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE code = ?1"),
    params![p.code],
    RawProperty::from_row,
  )?;
  raw.into_property()
}

pub fn upsert_line(conn: &Connection, l: &ProductionLine) -> Result<()> {
  conn.execute(
    "INSERT INTO lines (code, name, active) VALUES (?1, ?2, ?3)
     ON CONFLICT(code) DO UPDATE SET
       name = excluded.name,
       active = excluded.active",
    params![l.code, l.name, l.active],
  )?;
  Ok(())
}

pub fn upsert_shift(conn: &Connection, s: &Shift) -> Result<()> {
  conn.execute(
    "INSERT INTO shifts (code, name, starts_at, display_order)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(code) DO UPDATE SET
       name = excluded.name,
       starts_at = excluded.starts_at,
       display_order = excluded.display_order",
    params![s.code, s.name, encode_time(s.starts_at), s.display_order],
  )?;
  Ok(())
}

fn required_properties(
  conn: &Connection,
  kind: AnalysisKind,
) -> Result<Vec<String>> {
  let column = match kind {
    AnalysisKind::Pointwise => "required_pointwise",
    AnalysisKind::Composite => "required_composite",
  };
  let codes = conn
    .prepare(&format!(
      "SELECT code FROM properties WHERE {column} = 1
       ORDER BY display_order, code"
    ))?
    .query_map([], |r| r.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(codes)
}

// ─── Specifications ──────────────────────────────────────────────────────────

/// All specifications for a pair, newest first.
pub fn specification_history(
  conn: &Connection,
  product: &str,
  property: &str,
) -> Result<Vec<Specification>> {
  conn
    .prepare(&format!(
      "SELECT {SPECIFICATION_COLUMNS} FROM specifications
       WHERE product = ?1 AND property = ?2
       ORDER BY effective_from DESC"
    ))?
    .query_map(params![product, property], RawSpecification::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawSpecification::into_specification)
    .collect()
}

/// The specification covering `at`, through the cache.
pub fn specification_at(
  conn: &Connection,
  cache: &SpecCache,
  product: &str,
  property: &str,
  at: DateTime<Utc>,
) -> Result<Option<Specification>> {
  cache.active_at(product, property, at, || {
    specification_history(conn, product, property)
  })
}

/// Close the active specification of the pair (if any) and insert `new` as
/// the active one. The caller invalidates the cache after committing.
pub fn insert_specification(
  conn: &Connection,
  new: &NewSpecification,
  now: DateTime<Utc>,
) -> Result<Specification> {
  let catalog = load_catalog(conn)?;
  catalog.product(&new.product)?;
  let property = catalog.property(&new.property)?;
  new.validate(property.data_type)?;

  // Stored at microsecond precision; return what a later read returns.
  let effective_from = new.effective_from.unwrap_or(now).trunc_subsecs(6);

  let active: Option<String> = conn
    .query_row(
      "SELECT effective_from FROM specifications
       WHERE product = ?1 AND property = ?2 AND effective_to IS NULL",
      params![new.product, new.property],
      |r| r.get(0),
    )
    .optional()?;

  let from_str = encode_dt(effective_from);
  if let Some(active_from) = active {
    if from_str <= active_from {
      return Err(
        vermiqc_core::Error::InvalidEffectiveFrom {
          product:  new.product.clone(),
          property: new.property.clone(),
        }
        .into(),
      );
    }
    conn.execute(
      "UPDATE specifications SET effective_to = ?3
       WHERE product = ?1 AND property = ?2 AND effective_to IS NULL",
      params![new.product, new.property, from_str],
    )?;
  }

  let spec = Specification {
    spec_id: Uuid::new_v4(),
    product: new.product.clone(),
    property: new.property.clone(),
    limits: new.limits.clone(),
    effective_from,
    effective_to: None,
    notes: new.notes.clone(),
    recorded_at: now,
  };
  conn.execute(
    "INSERT INTO specifications (
       spec_id, product, property, limits_json, effective_from,
       effective_to, notes, recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7)",
    params![
      encode_uuid(spec.spec_id),
      spec.product,
      spec.property,
      encode_limits(&spec.limits)?,
      from_str,
      spec.notes,
      encode_dt(spec.recorded_at),
    ],
  )?;
  Ok(spec)
}

// ─── Samples ─────────────────────────────────────────────────────────────────

pub fn load_sample(conn: &Connection, sample_id: Uuid) -> Result<Option<Sample>> {
  conn
    .query_row(
      &format!("SELECT {SAMPLE_COLUMNS} FROM samples WHERE sample_id = ?1"),
      params![encode_uuid(sample_id)],
      RawSample::from_row,
    )
    .optional()?
    .map(RawSample::into_sample)
    .transpose()
}

fn load_measurements(
  conn: &Connection,
  sample_id: Uuid,
) -> Result<Vec<Measurement>> {
  conn
    .prepare(&format!(
      "SELECT {MEASUREMENT_COLUMNS} FROM measurements
       WHERE sample_id = ?1 ORDER BY property"
    ))?
    .query_map(params![encode_uuid(sample_id)], RawMeasurement::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawMeasurement::into_measurement)
    .collect()
}

pub fn load_view(conn: &Connection, sample_id: Uuid) -> Result<Option<SampleView>> {
  let Some(sample) = load_sample(conn, sample_id)? else {
    return Ok(None);
  };
  let measurements = load_measurements(conn, sample_id)?;
  Ok(Some(SampleView { sample, measurements }))
}

fn require_view(conn: &Connection, sample_id: Uuid) -> Result<SampleView> {
  load_view(conn, sample_id)?
    .ok_or_else(|| vermiqc_core::Error::SampleNotFound(sample_id).into())
}

pub fn find_sample_id(conn: &Connection, key: &SampleKey) -> Result<Option<Uuid>> {
  let id: Option<String> = conn
    .query_row(
      "SELECT sample_id FROM samples
       WHERE date = ?1 AND shift = ?2 AND line = ?3 AND product = ?4
         AND kind = ?5 AND sequence = ?6",
      params![
        encode_date(key.date),
        key.shift,
        key.line,
        key.product,
        key.kind.to_string(),
        key.sequence,
      ],
      |r| r.get(0),
    )
    .optional()?;
  id.as_deref().map(decode_uuid).transpose()
}

/// Reserve a sequence number under the key prefix. An explicit `sequence`
/// is recorded so later allocations skip past it; otherwise the next number
/// after the highest ever handed out is returned.
fn allocate_sequence(
  conn: &Connection,
  date: NaiveDate,
  shift: &str,
  line: &str,
  product: &str,
  kind: AnalysisKind,
  sequence: Option<u32>,
) -> Result<u32> {
  let date = encode_date(date);
  let kind = kind.to_string();
  let sequence = match sequence {
    Some(n) => n,
    None => {
      let last: Option<u32> = conn
        .query_row(
          "SELECT last_sequence FROM sequence_counters
           WHERE date = ?1 AND shift = ?2 AND line = ?3 AND product = ?4
             AND kind = ?5",
          params![date, shift, line, product, kind],
          |r| r.get(0),
        )
        .optional()?;
      last.unwrap_or(0) + 1
    }
  };
  conn.execute(
    "INSERT INTO sequence_counters (date, shift, line, product, kind, last_sequence)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT(date, shift, line, product, kind) DO UPDATE SET
       last_sequence = MAX(last_sequence, excluded.last_sequence)",
    params![date, shift, line, product, kind, sequence],
  )?;
  Ok(sequence)
}

/// Insert a DRAFT sample after checking its references and key.
pub fn insert_sample(
  conn: &Connection,
  input: &NewSample,
  ctx: &Ctx<'_>,
) -> Result<Sample> {
  let catalog = load_catalog(conn)?;
  catalog.product(&input.product)?;
  catalog.line(&input.line)?;
  let shift = catalog.shift(&input.shift)?;
  let requested = input.kind.check_sequence(input.sequence)?;
  let sample_time =
    resolve_sample_time(input.date, input.sample_time, shift, ctx.offset)?;

  if let Some(sequence) = requested {
    let key = SampleKey {
      date: input.date,
      shift: input.shift.clone(),
      line: input.line.clone(),
      product: input.product.clone(),
      kind: input.kind,
      sequence,
    };
    if find_sample_id(conn, &key)?.is_some() {
      return Err(vermiqc_core::Error::DuplicateSample(key.to_string()).into());
    }
  }

  let sequence = allocate_sequence(
    conn,
    input.date,
    &input.shift,
    &input.line,
    &input.product,
    input.kind,
    requested,
  )?;

  let sample = Sample {
    sample_id:    Uuid::new_v4(),
    key:          SampleKey {
      date:     input.date,
      shift:    input.shift.clone(),
      line:     input.line.clone(),
      product:  input.product.clone(),
      kind:     input.kind,
      sequence,
    },
    sample_time,
    operator:     input.operator.clone(),
    observations: input.observations.clone(),
    state:        SampleState::Draft,
    verdict:      Verdict::Approved,
    complete:     false,
    created_at:   ctx.now,
    updated_at:   ctx.now,
    sealed_at:    None,
  };

  conn.execute(
    &format!(
      "INSERT INTO samples ({SAMPLE_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, NULL)"
    ),
    params![
      encode_uuid(sample.sample_id),
      encode_date(sample.key.date),
      sample.key.shift,
      sample.key.line,
      sample.key.product,
      sample.key.kind.to_string(),
      sample.key.sequence,
      encode_dt(sample.sample_time),
      sample.operator,
      sample.observations,
      sample.state.to_string(),
      sample.verdict.to_string(),
      sample.complete,
      encode_dt(sample.created_at),
      encode_dt(sample.updated_at),
    ],
  )?;
  Ok(sample)
}

pub fn list_samples(conn: &Connection, filter: &SampleFilter) -> Result<Vec<Sample>> {
  let mut clauses: Vec<String> = Vec::new();
  let mut args: Vec<Value> = Vec::new();
  let mut push = |clause: &str, value: Value| {
    args.push(value);
    clauses.push(format!("{clause} ?{}", args.len()));
  };

  if let Some(from) = filter.date_from {
    push("date >=", Value::Text(encode_date(from)));
  }
  if let Some(to) = filter.date_to {
    push("date <", Value::Text(encode_date(to)));
  }
  if let Some(line) = &filter.line {
    push("line =", Value::Text(line.clone()));
  }
  if let Some(product) = &filter.product {
    push("product =", Value::Text(product.clone()));
  }
  if let Some(shift) = &filter.shift {
    push("shift =", Value::Text(shift.clone()));
  }
  if let Some(kind) = filter.kind {
    push("kind =", Value::Text(kind.to_string()));
  }
  if let Some(verdict) = filter.verdict {
    push("state = 'SEALED' AND verdict =", Value::Text(verdict.to_string()));
  }

  let mut sql = format!("SELECT {SAMPLE_COLUMNS} FROM samples");
  if !clauses.is_empty() {
    sql.push_str(" WHERE ");
    sql.push_str(&clauses.join(" AND "));
  }
  sql.push_str(" ORDER BY date, shift, line, product, kind, sequence");
  if filter.limit.is_some() || filter.offset.is_some() {
    let limit = filter.limit.map_or(-1, |l| l as i64);
    let offset = filter.offset.unwrap_or(0) as i64;
    sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
  }

  conn
    .prepare(&sql)?
    .query_map(rusqlite::params_from_iter(args), RawSample::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawSample::into_sample)
    .collect()
}

pub fn delete_sample(conn: &Connection, sample_id: Uuid) -> Result<()> {
  let deleted = conn.execute(
    "DELETE FROM samples WHERE sample_id = ?1",
    params![encode_uuid(sample_id)],
  )?;
  if deleted == 0 {
    return Err(vermiqc_core::Error::SampleNotFound(sample_id).into());
  }
  Ok(())
}

// ─── Measurements ────────────────────────────────────────────────────────────

/// Parse `input` at its property's data type.
fn parse_measurement(
  conn: &Connection,
  input: &NewMeasurement,
) -> Result<ParsedMeasurement> {
  let raw = conn
    .query_row(
      &format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE code = ?1"),
      params![input.property],
      RawProperty::from_row,
    )
    .optional()?
    .ok_or_else(|| vermiqc_core::Error::UnknownProperty(input.property.clone()))?;
  let property = raw.into_property()?;
  Ok(ParsedMeasurement {
    value:    MeasuredValue::parse(&property.code, &input.value, property.data_type)?,
    property: property.code,
    unit:     input.unit.clone().filter(|u| !u.trim().is_empty()),
  })
}

fn insert_measurement(
  conn: &Connection,
  sample_id: Uuid,
  parsed: &ParsedMeasurement,
  now: DateTime<Utc>,
) -> Result<Uuid> {
  let measurement_id = Uuid::new_v4();
  let (value_type, value) = encode_value(&parsed.value);
  let inserted = conn.execute(
    "INSERT INTO measurements (
       measurement_id, sample_id, property, value_type, value, unit,
       classification, unspecified, spec_id, recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'APPROVED', 0, NULL, ?7)
     ON CONFLICT(sample_id, property) DO NOTHING",
    params![
      encode_uuid(measurement_id),
      encode_uuid(sample_id),
      parsed.property,
      value_type,
      value,
      parsed.unit,
      encode_dt(now),
    ],
  )?;
  if inserted == 0 {
    return Err(
      vermiqc_core::Error::DuplicateMeasurement {
        sample_id: Some(sample_id),
        property:  parsed.property.clone(),
      }
      .into(),
    );
  }
  Ok(measurement_id)
}

/// Replace the value of an existing measurement, keeping its id.
fn replace_measurement(
  conn: &Connection,
  measurement_id: Uuid,
  parsed: &ParsedMeasurement,
  now: DateTime<Utc>,
) -> Result<()> {
  let (value_type, value) = encode_value(&parsed.value);
  conn.execute(
    "UPDATE measurements
     SET value_type = ?2, value = ?3, unit = ?4, recorded_at = ?5
     WHERE measurement_id = ?1",
    params![
      encode_uuid(measurement_id),
      value_type,
      value,
      parsed.unit,
      encode_dt(now),
    ],
  )?;
  Ok(())
}

fn touch_sample(conn: &Connection, sample_id: Uuid, now: DateTime<Utc>) -> Result<()> {
  conn.execute(
    "UPDATE samples SET updated_at = ?2 WHERE sample_id = ?1",
    params![encode_uuid(sample_id), encode_dt(now)],
  )?;
  Ok(())
}

/// Attach a new measurement, then re-seal.
pub fn attach_measurement(
  conn: &Connection,
  sample_id: Uuid,
  input: &NewMeasurement,
  ctx: &Ctx<'_>,
) -> Result<Measurement> {
  require_view(conn, sample_id)?;
  let parsed = parse_measurement(conn, input)?;
  let measurement_id = insert_measurement(conn, sample_id, &parsed, ctx.now)?;
  touch_sample(conn, sample_id, ctx.now)?;
  sealed_measurement(conn, sample_id, measurement_id, ctx)
}

/// Attach or replace the measurement for `input.property`, then re-seal.
pub fn upsert_measurement(
  conn: &Connection,
  sample_id: Uuid,
  input: &NewMeasurement,
  ctx: &Ctx<'_>,
) -> Result<Measurement> {
  let view = require_view(conn, sample_id)?;
  let parsed = parse_measurement(conn, input)?;
  let measurement_id = match view.measurement(&parsed.property) {
    Some(existing) => {
      replace_measurement(conn, existing.measurement_id, &parsed, ctx.now)?;
      existing.measurement_id
    }
    None => insert_measurement(conn, sample_id, &parsed, ctx.now)?,
  };
  touch_sample(conn, sample_id, ctx.now)?;
  sealed_measurement(conn, sample_id, measurement_id, ctx)
}

fn sealed_measurement(
  conn: &Connection,
  sample_id: Uuid,
  measurement_id: Uuid,
  ctx: &Ctx<'_>,
) -> Result<Measurement> {
  let (view, _) = seal(conn, sample_id, ctx)?;
  view
    .measurements
    .into_iter()
    .find(|m| m.measurement_id == measurement_id)
    .ok_or_else(|| vermiqc_core::Error::MeasurementNotFound(measurement_id).into())
}

/// The sample a measurement belongs to.
pub fn measurement_owner(conn: &Connection, measurement_id: Uuid) -> Result<Uuid> {
  let owner: Option<String> = conn
    .query_row(
      "SELECT sample_id FROM measurements WHERE measurement_id = ?1",
      params![encode_uuid(measurement_id)],
      |r| r.get(0),
    )
    .optional()?;
  match owner {
    Some(id) => decode_uuid(&id),
    None => Err(vermiqc_core::Error::MeasurementNotFound(measurement_id).into()),
  }
}

/// Remove a measurement, then re-seal its sample.
pub fn detach_measurement(
  conn: &Connection,
  measurement_id: Uuid,
  ctx: &Ctx<'_>,
) -> Result<SampleView> {
  let sample_id = measurement_owner(conn, measurement_id)?;
  conn.execute(
    "DELETE FROM measurements WHERE measurement_id = ?1",
    params![encode_uuid(measurement_id)],
  )?;
  touch_sample(conn, sample_id, ctx.now)?;
  Ok(seal(conn, sample_id, ctx)?.0)
}

// ─── Seal ────────────────────────────────────────────────────────────────────

/// Classify every measurement of the sample against the specifications in
/// force at its `sample_time`, and persist the verdict.
pub fn seal(
  conn: &Connection,
  sample_id: Uuid,
  ctx: &Ctx<'_>,
) -> Result<(SampleView, SealOutcome)> {
  let mut view = require_view(conn, sample_id)?;
  let at = view.sample.sample_time;
  let product = view.sample.key.product.clone();

  let mut specs: HashMap<String, Specification> = HashMap::new();
  for m in &view.measurements {
    if let Some(spec) =
      specification_at(conn, ctx.cache, &product, &m.property, at)?
    {
      specs.insert(m.property.clone(), spec);
    }
  }

  let required = required_properties(conn, view.sample.key.kind)?;
  let outcome = evaluate(&view.measurements, &required, |p| specs.get(p));
  outcome.apply_to(&mut view, ctx.now);

  for m in &view.measurements {
    conn.execute(
      "UPDATE measurements SET classification = ?2, unspecified = ?3, spec_id = ?4
       WHERE measurement_id = ?1",
      params![
        encode_uuid(m.measurement_id),
        m.classification.to_string(),
        m.unspecified,
        m.spec_id.map(encode_uuid),
      ],
    )?;
  }
  conn.execute(
    "UPDATE samples SET state = ?2, verdict = ?3, complete = ?4, sealed_at = ?5
     WHERE sample_id = ?1",
    params![
      encode_uuid(sample_id),
      view.sample.state.to_string(),
      view.sample.verdict.to_string(),
      view.sample.complete,
      view.sample.sealed_at.map(encode_dt),
    ],
  )?;

  tracing::debug!(
    %sample_id,
    verdict = %view.sample.verdict,
    complete = view.sample.complete,
    "sample sealed"
  );
  Ok((view, outcome))
}

// ─── Ingest ──────────────────────────────────────────────────────────────────

/// Apply one submission: create, leave unchanged, or replace under update
/// intent. Runs inside the caller's transaction or savepoint; any error
/// leaves it to be rolled back.
pub fn apply_submission(
  conn: &Connection,
  submission: &Submission,
  ctx: &Ctx<'_>,
) -> Result<IngestOutcome> {
  let catalog = load_catalog(conn)?;
  let validated = submission.validate(&catalog, ctx.offset)?;

  let existing = match validated.sequence {
    Some(sequence) => {
      let key = SampleKey {
        date: submission.date,
        shift: submission.shift.clone(),
        line: submission.line.clone(),
        product: submission.product.clone(),
        kind: submission.kind,
        sequence,
      };
      match find_sample_id(conn, &key)? {
        Some(id) => Some((key, require_view(conn, id)?)),
        None => None,
      }
    }
    None => None,
  };

  let (status, sample_id) = match existing {
    // A draft with the same payload is sealed but keeps its contents.
    Some((_, view))
      if !view.sample.is_sealed()
        && validated.is_identical_to(submission, &view) =>
    {
      (IngestStatus::Unchanged, view.sample.sample_id)
    }
    Some((_, view)) if validated.is_identical_to(submission, &view) => {
      let missing_required = validated
        .required
        .iter()
        .filter(|code| view.measurement(code).is_none())
        .cloned()
        .collect();
      return Ok(IngestOutcome {
        status: IngestStatus::Unchanged,
        view,
        missing_required,
      });
    }
    Some((key, _)) if !submission.update => {
      return Err(vermiqc_core::Error::DuplicateSample(key.to_string()).into());
    }
    Some((_, view)) => {
      replace_sample(
        conn,
        &view,
        submission,
        &validated.measurements,
        validated.sample_time,
        ctx,
      )?;
      (IngestStatus::Updated, view.sample.sample_id)
    }
    None => {
      let sample = insert_sample(
        conn,
        &NewSample {
          date:         submission.date,
          shift:        submission.shift.clone(),
          line:         submission.line.clone(),
          product:      submission.product.clone(),
          kind:         submission.kind,
          sequence:     validated.sequence,
          sample_time:  Some(validated.sample_time),
          operator:     submission.operator.clone(),
          observations: submission.observations.clone(),
        },
        ctx,
      )?;
      for parsed in &validated.measurements {
        insert_measurement(conn, sample.sample_id, parsed, ctx.now)?;
      }
      (IngestStatus::Created, sample.sample_id)
    }
  };

  let (view, outcome) = seal(conn, sample_id, ctx)?;

  if submission.require_specification {
    if let Some(property) = outcome.unspecified(&view.measurements).first() {
      return Err(
        vermiqc_core::Error::StaleSpecification {
          product:  submission.product.clone(),
          property: (*property).to_owned(),
        }
        .into(),
      );
    }
  }

  Ok(IngestOutcome {
    status,
    view,
    missing_required: outcome.missing_required,
  })
}

/// Overwrite metadata and make the measurement set equal to `measurements`.
/// Measurements whose property is absent from the new set are removed.
fn replace_sample(
  conn: &Connection,
  view: &SampleView,
  submission: &Submission,
  measurements: &[ParsedMeasurement],
  sample_time: DateTime<Utc>,
  ctx: &Ctx<'_>,
) -> Result<()> {
  let sample_id = view.sample.sample_id;
  conn.execute(
    "UPDATE samples
     SET sample_time = ?2, operator = ?3, observations = ?4, updated_at = ?5
     WHERE sample_id = ?1",
    params![
      encode_uuid(sample_id),
      encode_dt(sample_time),
      submission.operator,
      submission.observations,
      encode_dt(ctx.now),
    ],
  )?;

  for old in &view.measurements {
    if !measurements.iter().any(|m| m.property == old.property) {
      conn.execute(
        "DELETE FROM measurements WHERE measurement_id = ?1",
        params![encode_uuid(old.measurement_id)],
      )?;
    }
  }
  for parsed in measurements {
    match view.measurement(&parsed.property) {
      Some(old) if old.value == parsed.value && old.unit == parsed.unit => {}
      Some(old) => replace_measurement(conn, old.measurement_id, parsed, ctx.now)?,
      None => {
        insert_measurement(conn, sample_id, parsed, ctx.now)?;
      }
    }
  }
  Ok(())
}

// ─── Dashboard ───────────────────────────────────────────────────────────────

/// Sealed samples in the query window or dated `today`, with their
/// measurements, matching the line/product/shift filters.
pub fn dashboard_views(
  conn: &Connection,
  query: &DashboardQuery,
  today: NaiveDate,
) -> Result<Vec<SampleView>> {
  let mut clauses = vec![
    "s.state = 'SEALED'".to_owned(),
    "((s.date >= ?1 AND s.date < ?2) OR s.date = ?3)".to_owned(),
  ];
  let mut args: Vec<Value> = vec![
    Value::Text(encode_date(query.from)),
    Value::Text(encode_date(query.to)),
    Value::Text(encode_date(today)),
  ];
  for (column, filter) in [
    ("s.line", &query.line),
    ("s.product", &query.product),
    ("s.shift", &query.shift),
  ] {
    if let Some(value) = filter {
      args.push(Value::Text(value.clone()));
      clauses.push(format!("{column} = ?{}", args.len()));
    }
  }
  let filter = clauses.join(" AND ");

  let sample_columns = SAMPLE_COLUMNS
    .split(", ")
    .map(|c| format!("s.{}", c.trim()))
    .collect::<Vec<_>>()
    .join(", ");
  let samples = conn
    .prepare(&format!(
      "SELECT {sample_columns} FROM samples s WHERE {filter}
       ORDER BY s.date, s.shift, s.line, s.product, s.kind, s.sequence"
    ))?
    .query_map(rusqlite::params_from_iter(args.iter()), RawSample::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawSample::into_sample)
    .collect::<Result<Vec<_>>>()?;

  let measurement_columns = MEASUREMENT_COLUMNS
    .split(", ")
    .map(|c| format!("m.{}", c.trim()))
    .collect::<Vec<_>>()
    .join(", ");
  let mut by_sample: HashMap<Uuid, Vec<Measurement>> = HashMap::new();
  let measurements = conn
    .prepare(&format!(
      "SELECT {measurement_columns} FROM measurements m
       JOIN samples s ON s.sample_id = m.sample_id
       WHERE {filter}
       ORDER BY m.property"
    ))?
    .query_map(rusqlite::params_from_iter(args.iter()), RawMeasurement::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  for raw in measurements {
    let m = raw.into_measurement()?;
    by_sample.entry(m.sample_id).or_default().push(m);
  }

  Ok(
    samples
      .into_iter()
      .map(|sample| SampleView {
        measurements: by_sample.remove(&sample.sample_id).unwrap_or_default(),
        sample,
      })
      .collect(),
  )
}
