//! Dashboard aggregation over sealed samples.
//!
//! The headline counts are over **samples**, never over measurements: a
//! sample with eight rejected measurements is one rejection. Measurement
//! counts are reported separately as a secondary view.
//!
//! Buckets are derived from the sample's declared date and shift (and the
//! local hour of its declared sample time), never from when it was entered,
//! so retroactive entries land where they belong.

use std::collections::BTreeMap;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  catalog::Shift,
  sample::{Sample, SampleView},
  verdict::Verdict,
};

// ─── Query ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Granularity {
  Hour,
  Shift,
  #[default]
  Day,
}

/// A window `[from, to)` over declared sample dates plus optional filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardQuery {
  pub from:        NaiveDate,
  pub to:          NaiveDate,
  #[serde(default)]
  pub line:        Option<String>,
  #[serde(default)]
  pub product:     Option<String>,
  #[serde(default)]
  pub shift:       Option<String>,
  #[serde(default)]
  pub granularity: Granularity,
}

impl DashboardQuery {
  /// Line/product/shift filters, ignoring the date window.
  pub fn matches_filters(&self, sample: &Sample) -> bool {
    let key = &sample.key;
    self.line.as_ref().is_none_or(|l| *l == key.line)
      && self.product.as_ref().is_none_or(|p| *p == key.product)
      && self.shift.as_ref().is_none_or(|s| *s == key.shift)
  }

  pub fn in_window(&self, date: NaiveDate) -> bool {
    self.from <= date && date < self.to
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
  pub bucket_start:     NaiveDateTime,
  pub samples_total:    u64,
  pub samples_rejected: u64,
  pub samples_alert:    u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRejectionRate {
  pub product:               String,
  pub property:              String,
  pub measurements_total:    u64,
  pub measurements_rejected: u64,
  /// `measurements_rejected / measurements_total`.
  pub rejection_rate:        f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardReport {
  pub from:                       NaiveDate,
  pub to:                         NaiveDate,
  pub granularity:                Granularity,

  pub samples_total:              u64,
  pub samples_approved:           u64,
  pub samples_alert:              u64,
  pub samples_rejected:           u64,
  pub samples_incomplete:         u64,

  pub measurements_total:         u64,
  pub measurements_approved:      u64,
  pub measurements_alert:         u64,
  pub measurements_rejected:      u64,
  /// Measurements classified with no active specification.
  pub measurements_unspecified:   u64,

  pub per_property_rejection_rate: Vec<PropertyRejectionRate>,

  pub today:                      NaiveDate,
  pub today_rejections:           u64,
  pub today_alerts:               u64,

  pub series:                     Vec<SeriesPoint>,
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Build the report from one consistent snapshot of samples.
///
/// `views` may contain samples outside the window (the store also returns
/// today's samples); drafts are ignored. `offset` is the plant's UTC offset,
/// used for hour buckets. `shifts` anchors shift buckets; an unknown shift
/// buckets at midnight.
pub fn build(
  query: &DashboardQuery,
  views: &[SampleView],
  today: NaiveDate,
  offset: FixedOffset,
  shifts: &BTreeMap<String, Shift>,
) -> DashboardReport {
  let mut report = DashboardReport {
    from: query.from,
    to: query.to,
    granularity: query.granularity,
    samples_total: 0,
    samples_approved: 0,
    samples_alert: 0,
    samples_rejected: 0,
    samples_incomplete: 0,
    measurements_total: 0,
    measurements_approved: 0,
    measurements_alert: 0,
    measurements_rejected: 0,
    measurements_unspecified: 0,
    per_property_rejection_rate: Vec::new(),
    today,
    today_rejections: 0,
    today_alerts: 0,
    series: Vec::new(),
  };

  let mut per_property: BTreeMap<(String, String), (u64, u64)> = BTreeMap::new();
  let mut buckets: BTreeMap<NaiveDateTime, SeriesPoint> = BTreeMap::new();

  let sealed = views
    .iter()
    .filter(|v| v.sample.is_sealed() && query.matches_filters(&v.sample));

  for view in sealed {
    let sample = &view.sample;

    if sample.key.date == today {
      match sample.verdict {
        Verdict::Rejected => report.today_rejections += 1,
        Verdict::Alert => report.today_alerts += 1,
        Verdict::Approved => {}
      }
    }

    if !query.in_window(sample.key.date) {
      continue;
    }

    // One sample, one count, whatever its measurement count.
    report.samples_total += 1;
    match sample.verdict {
      Verdict::Approved => report.samples_approved += 1,
      Verdict::Alert => report.samples_alert += 1,
      Verdict::Rejected => report.samples_rejected += 1,
    }
    if !sample.complete {
      report.samples_incomplete += 1;
    }

    for m in &view.measurements {
      report.measurements_total += 1;
      match m.classification {
        Verdict::Approved => report.measurements_approved += 1,
        Verdict::Alert => report.measurements_alert += 1,
        Verdict::Rejected => report.measurements_rejected += 1,
      }
      if m.unspecified {
        report.measurements_unspecified += 1;
      }
      let entry = per_property
        .entry((sample.key.product.clone(), m.property.clone()))
        .or_default();
      entry.0 += 1;
      if m.classification == Verdict::Rejected {
        entry.1 += 1;
      }
    }

    let start = bucket_start(sample, query.granularity, offset, shifts);
    let point = buckets.entry(start).or_insert_with(|| SeriesPoint {
      bucket_start:     start,
      samples_total:    0,
      samples_rejected: 0,
      samples_alert:    0,
    });
    point.samples_total += 1;
    match sample.verdict {
      Verdict::Rejected => point.samples_rejected += 1,
      Verdict::Alert => point.samples_alert += 1,
      Verdict::Approved => {}
    }
  }

  report.per_property_rejection_rate = per_property
    .into_iter()
    .map(|((product, property), (total, rejected))| PropertyRejectionRate {
      product,
      property,
      measurements_total: total,
      measurements_rejected: rejected,
      rejection_rate: if total == 0 {
        0.0
      } else {
        rejected as f64 / total as f64
      },
    })
    .collect();
  report.series = buckets.into_values().collect();
  report
}

fn bucket_start(
  sample: &Sample,
  granularity: Granularity,
  offset: FixedOffset,
  shifts: &BTreeMap<String, Shift>,
) -> NaiveDateTime {
  let date = sample.key.date;
  match granularity {
    Granularity::Day => date.and_time(NaiveTime::MIN),
    Granularity::Shift => {
      let starts_at = shifts
        .get(&sample.key.shift)
        .map(|s| s.starts_at)
        .unwrap_or(NaiveTime::MIN);
      date.and_time(starts_at)
    }
    Granularity::Hour => {
      let hour = sample.sample_time.with_timezone(&offset).hour();
      let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
      date.and_time(time)
    }
  }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use chrono::{DateTime, TimeZone, Utc};
  use rust_decimal::Decimal;
  use uuid::Uuid;

  use super::*;
  use crate::{
    sample::{AnalysisKind, Measurement, SampleKey, SampleState},
    value::MeasuredValue,
  };

  fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
  }

  fn utc(h: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 3, 14, h, 30, 0).unwrap() }

  fn view(
    date: NaiveDate,
    shift: &str,
    verdict: Verdict,
    measurement_verdicts: &[Verdict],
  ) -> SampleView {
    let sample_id = Uuid::new_v4();
    let sample = Sample {
      sample_id,
      key: SampleKey {
        date,
        shift: shift.into(),
        line: "L1".into(),
        product: "V-MED".into(),
        kind: AnalysisKind::Composite,
        sequence: 1,
      },
      sample_time: utc(12),
      operator: "ana".into(),
      observations: None,
      state: SampleState::Sealed,
      verdict,
      complete: true,
      created_at: utc(12),
      updated_at: utc(12),
      sealed_at: Some(utc(12)),
    };
    let measurements = measurement_verdicts
      .iter()
      .enumerate()
      .map(|(i, v)| Measurement {
        measurement_id: Uuid::new_v4(),
        sample_id,
        property: format!("P{i}"),
        value: MeasuredValue::Numeric(Decimal::from_str("1").unwrap()),
        unit: None,
        classification: *v,
        unspecified: false,
        spec_id: None,
        recorded_at: utc(12),
      })
      .collect();
    SampleView { sample, measurements }
  }

  fn query(from: NaiveDate, to: NaiveDate) -> DashboardQuery {
    DashboardQuery {
      from,
      to,
      line: None,
      product: None,
      shift: None,
      granularity: Granularity::Day,
    }
  }

  fn shifts() -> BTreeMap<String, Shift> {
    [("A", 6), ("B", 14), ("C", 22)]
      .into_iter()
      .map(|(code, h)| {
        (code.to_string(), Shift {
          code:          code.into(),
          name:          format!("Turno {code}"),
          starts_at:     NaiveTime::from_hms_opt(h, 0, 0).unwrap(),
          display_order: 0,
        })
      })
      .collect()
  }

  fn utc_offset() -> FixedOffset { FixedOffset::west_opt(3 * 3600).unwrap() }

  #[test]
  fn rejected_sample_with_many_rejected_measurements_counts_once() {
    let day = d(2024, 3, 14);
    let views = vec![view(day, "A", Verdict::Rejected, &[Verdict::Rejected; 8])];
    let q = query(day, d(2024, 3, 15));
    let r = build(&q, &views, d(2024, 4, 1), utc_offset(), &shifts());
    assert_eq!(r.samples_rejected, 1);
    assert_eq!(r.measurements_rejected, 8);
    assert_eq!(r.samples_total, 1);
  }

  #[test]
  fn mixed_composite_adds_one_of_each() {
    let day = d(2024, 3, 14);
    let views = vec![view(day, "A", Verdict::Rejected, &[
      Verdict::Approved,
      Verdict::Approved,
      Verdict::Alert,
      Verdict::Rejected,
    ])];
    let r = build(
      &query(day, d(2024, 3, 15)),
      &views,
      day,
      utc_offset(),
      &shifts(),
    );
    assert_eq!(r.samples_total, 1);
    assert_eq!(r.samples_rejected, 1);
    assert_eq!(r.measurements_total, 4);
    assert_eq!(r.measurements_rejected, 1);
    assert_eq!(r.measurements_alert, 1);
    assert_eq!(r.per_property_rejection_rate.len(), 4);
    let p3 = &r.per_property_rejection_rate[3];
    assert_eq!(p3.property, "P3");
    assert_eq!(p3.rejection_rate, 1.0);
  }

  #[test]
  fn window_is_half_open_and_drafts_are_ignored() {
    let mut draft = view(d(2024, 3, 14), "A", Verdict::Rejected, &[]);
    draft.sample.state = SampleState::Draft;
    let views = vec![
      view(d(2024, 3, 13), "A", Verdict::Rejected, &[]),
      view(d(2024, 3, 14), "A", Verdict::Alert, &[]),
      view(d(2024, 3, 15), "A", Verdict::Rejected, &[]),
      draft,
    ];
    let r = build(
      &query(d(2024, 3, 14), d(2024, 3, 15)),
      &views,
      d(2024, 4, 1),
      utc_offset(),
      &shifts(),
    );
    assert_eq!(r.samples_total, 1);
    assert_eq!(r.samples_alert, 1);
    assert_eq!(r.samples_rejected, 0);
  }

  #[test]
  fn today_counts_ignore_the_window() {
    let today = d(2024, 3, 20);
    let views = vec![
      view(today, "A", Verdict::Rejected, &[Verdict::Rejected; 3]),
      view(today, "B", Verdict::Alert, &[Verdict::Alert]),
      view(d(2024, 3, 14), "A", Verdict::Rejected, &[]),
    ];
    let r = build(
      &query(d(2024, 3, 14), d(2024, 3, 15)),
      &views,
      today,
      utc_offset(),
      &shifts(),
    );
    assert_eq!(r.today_rejections, 1);
    assert_eq!(r.today_alerts, 1);
    assert_eq!(r.samples_total, 1);
  }

  #[test]
  fn shift_buckets_use_declared_shift() {
    let day = d(2024, 3, 14);
    let views = vec![
      view(day, "A", Verdict::Rejected, &[]),
      view(day, "A", Verdict::Approved, &[]),
      view(day, "C", Verdict::Alert, &[]),
    ];
    let mut q = query(day, d(2024, 3, 15));
    q.granularity = Granularity::Shift;
    let r = build(&q, &views, day, utc_offset(), &shifts());
    assert_eq!(r.series.len(), 2);
    assert_eq!(r.series[0].bucket_start, day.and_hms_opt(6, 0, 0).unwrap());
    assert_eq!(r.series[0].samples_total, 2);
    assert_eq!(r.series[0].samples_rejected, 1);
    assert_eq!(r.series[1].bucket_start, day.and_hms_opt(22, 0, 0).unwrap());
    assert_eq!(r.series[1].samples_alert, 1);
  }

  #[test]
  fn hour_buckets_use_local_sample_time() {
    let day = d(2024, 3, 14);
    let views = vec![view(day, "A", Verdict::Approved, &[])];
    let mut q = query(day, d(2024, 3, 15));
    q.granularity = Granularity::Hour;
    let r = build(&q, &views, day, utc_offset(), &shifts());
    // 12:30 UTC is 09:30 at UTC-3.
    assert_eq!(r.series[0].bucket_start, day.and_hms_opt(9, 0, 0).unwrap());
  }

  #[test]
  fn filters_apply() {
    let day = d(2024, 3, 14);
    let views = vec![view(day, "A", Verdict::Rejected, &[])];
    let mut q = query(day, d(2024, 3, 15));
    q.line = Some("L2".into());
    let r = build(&q, &views, day, utc_offset(), &shifts());
    assert_eq!(r.samples_total, 0);
    assert_eq!(r.today_rejections, 0);
  }
}
