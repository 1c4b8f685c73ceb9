//! The `QcStore` trait.
//!
//! Implemented by storage backends (e.g. `vermiqc-store-sqlite`). Higher
//! layers (`vermiqc-api`, `vermiqc-server`) depend on this abstraction, not on
//! any concrete backend.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
  DomainError,
  catalog::{Catalog, Product, ProductionLine, Property, Shift},
  dashboard::DashboardQuery,
  ingest::{BatchItem, BatchOptions, BatchReport, IngestOutcome, Submission},
  sample::{
    Measurement, NewMeasurement, NewSample, Sample, SampleFilter, SampleKey,
    SampleView,
  },
  specification::{NewSpecification, Specification},
};

/// Abstraction over a QC store backend.
///
/// Every mutation of a sample (attach, upsert, detach, seal, delete) runs
/// under a lock keyed by the sample id and inside one transaction, and
/// leaves the sample sealed against its current measurements.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait QcStore: Send + Sync {
  type Error: std::error::Error + DomainError + Send + Sync + 'static;

  // ── Catalog ───────────────────────────────────────────────────────────

  /// Insert a product, or update the cosmetic fields of an existing one.
  fn upsert_product(
    &self,
    product: Product,
  ) -> impl Future<Output = Result<Product, Self::Error>> + Send + '_;

  fn upsert_property(
    &self,
    property: Property,
  ) -> impl Future<Output = Result<Property, Self::Error>> + Send + '_;

  fn upsert_line(
    &self,
    line: ProductionLine,
  ) -> impl Future<Output = Result<ProductionLine, Self::Error>> + Send + '_;

  fn upsert_shift(
    &self,
    shift: Shift,
  ) -> impl Future<Output = Result<Shift, Self::Error>> + Send + '_;

  /// Snapshot of all reference data.
  fn catalog(
    &self,
  ) -> impl Future<Output = Result<Catalog, Self::Error>> + Send + '_;

  // ── Specification registry ────────────────────────────────────────────

  /// Make `spec` the active specification for its pair from its
  /// `effective_from` (default now), closing the previous one.
  fn upsert_specification(
    &self,
    spec: NewSpecification,
  ) -> impl Future<Output = Result<Specification, Self::Error>> + Send + '_;

  /// The specification covering `at` (default now), if any.
  fn get_active_specification(
    &self,
    product: String,
    property: String,
    at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Option<Specification>, Self::Error>> + Send + '_;

  /// All specifications for a pair, newest first.
  fn specification_history(
    &self,
    product: String,
    property: String,
  ) -> impl Future<Output = Result<Vec<Specification>, Self::Error>> + Send + '_;

  // ── Samples ───────────────────────────────────────────────────────────

  /// Create a DRAFT sample. Fails with `DuplicateSample` if the key exists.
  fn create_sample(
    &self,
    input: NewSample,
  ) -> impl Future<Output = Result<Sample, Self::Error>> + Send + '_;

  fn get_sample(
    &self,
    sample_id: Uuid,
  ) -> impl Future<Output = Result<Option<SampleView>, Self::Error>> + Send + '_;

  fn find_sample(
    &self,
    key: SampleKey,
  ) -> impl Future<Output = Result<Option<SampleView>, Self::Error>> + Send + '_;

  fn list_samples<'a>(
    &'a self,
    filter: &'a SampleFilter,
  ) -> impl Future<Output = Result<Vec<Sample>, Self::Error>> + Send + 'a;

  /// Add a measurement and re-seal. Fails with `DuplicateMeasurement` if the
  /// property is already measured on the sample.
  fn attach_measurement(
    &self,
    sample_id: Uuid,
    input: NewMeasurement,
  ) -> impl Future<Output = Result<Measurement, Self::Error>> + Send + '_;

  /// Add or replace the measurement for `input.property` and re-seal.
  fn upsert_measurement(
    &self,
    sample_id: Uuid,
    input: NewMeasurement,
  ) -> impl Future<Output = Result<Measurement, Self::Error>> + Send + '_;

  /// Remove a measurement and re-seal its sample.
  fn detach_measurement(
    &self,
    measurement_id: Uuid,
  ) -> impl Future<Output = Result<SampleView, Self::Error>> + Send + '_;

  /// Delete a sample and, by cascade, its measurements.
  fn delete_sample(
    &self,
    sample_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Re-classify every measurement and stamp the sample verdict.
  /// Idempotent.
  fn seal(
    &self,
    sample_id: Uuid,
  ) -> impl Future<Output = Result<SampleView, Self::Error>> + Send + '_;

  // ── Ingest ────────────────────────────────────────────────────────────

  /// Create, leave unchanged, or update one sample atomically.
  fn submit(
    &self,
    submission: Submission,
  ) -> impl Future<Output = Result<IngestOutcome, Self::Error>> + Send + '_;

  /// Apply a batch of grouped submissions. Group-level failures are
  /// reported per row; `options` decide whether they abort the batch and
  /// how it commits. Cancelling `cancel` stops at the next group boundary.
  fn submit_batch(
    &self,
    items: Vec<BatchItem>,
    options: BatchOptions,
    cancel: CancellationToken,
  ) -> impl Future<Output = Result<BatchReport, Self::Error>> + Send + '_;

  // ── Dashboard ─────────────────────────────────────────────────────────

  /// One consistent snapshot of the samples a dashboard query needs: those
  /// in the window plus those dated `today`, with their measurements.
  fn dashboard_snapshot<'a>(
    &'a self,
    query: &'a DashboardQuery,
    today: NaiveDate,
  ) -> impl Future<Output = Result<Vec<SampleView>, Self::Error>> + Send + 'a;
}
