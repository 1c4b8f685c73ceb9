//! [`SqliteStore`]: the SQLite implementation of [`QcStore`].

use std::{path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, FixedOffset, NaiveDate, Offset as _, SubsecRound as _, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vermiqc_core::{
  catalog::{Catalog, Product, ProductionLine, Property, Shift},
  dashboard::DashboardQuery,
  ingest::{BatchItem, BatchOptions, BatchReport, IngestOutcome, Submission},
  sample::{
    Measurement, NewMeasurement, NewSample, Sample, SampleFilter, SampleKey,
    SampleView,
  },
  specification::{NewSpecification, Specification},
  store::QcStore,
  verdict::Verdict,
};

use crate::{
  Error, Result,
  cache::SpecCache,
  locks::SampleLocks,
  ops::{self, Ctx},
  retry,
  schema::SCHEMA,
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Plant settings the store needs to classify and default times.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
  /// Offset of plant-local time from UTC; anchors default sample times.
  pub utc_offset:    FixedOffset,
  /// How long lock errors are retried before `BackendUnavailable`.
  pub retry_ceiling: Duration,
}

impl Default for StoreOptions {
  fn default() -> Self {
    Self {
      utc_offset:    Utc.fix(),
      retry_ceiling: Duration::from_secs(5),
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A QC store backed by a single SQLite file.
///
/// Cloning is cheap; the connection, cache, and lock table are shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  options: StoreOptions,
  cache:   Arc<SpecCache>,
  locks:   Arc<SampleLocks>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(
    path: impl AsRef<Path>,
    options: StoreOptions,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, options).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, StoreOptions::default()).await
  }

  async fn init(
    conn: tokio_rusqlite::Connection,
    options: StoreOptions,
  ) -> Result<Self> {
    conn
      .call(|conn| {
        // Lock waits are handled by our own backoff, not SQLite's.
        conn.busy_timeout(Duration::ZERO)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      options,
      cache: Arc::default(),
      locks: Arc::default(),
    })
  }

  pub fn options(&self) -> StoreOptions { self.options }

  /// Run `f` on the connection thread, retrying lock errors with backoff.
  async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T>
  where
    F: Fn(&mut rusqlite::Connection, &Ctx<'_>) -> Result<T>
      + Send
      + Sync
      + 'static,
    T: Send + 'static,
  {
    let f = Arc::new(f);
    retry::with_backoff(operation, self.options.retry_ceiling, || {
      let f = Arc::clone(&f);
      let cache = Arc::clone(&self.cache);
      let offset = self.options.utc_offset;
      let conn = self.conn.clone();
      async move {
        conn
          .call(move |conn| {
            let now = Utc::now().trunc_subsecs(6);
            let ctx = Ctx { cache: &cache, offset, now };
            f(conn, &ctx).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
          })
          .await
          .map_err(Error::from)
      }
    })
    .await
  }

  /// Run `f` inside one transaction, committed when `f` succeeds.
  async fn write<T, F>(&self, operation: &'static str, f: F) -> Result<T>
  where
    F: Fn(&rusqlite::Connection, &Ctx<'_>) -> Result<T> + Send + Sync + 'static,
    T: Send + 'static,
  {
    self
      .run(operation, move |conn, ctx| {
        let tx = conn.transaction()?;
        let out = f(&tx, ctx)?;
        tx.commit()?;
        Ok(out)
      })
      .await
  }

  async fn submit_per_group(
    &self,
    items: Vec<BatchItem>,
    cancel: CancellationToken,
  ) -> Result<BatchReport> {
    let mut report = BatchReport::default();
    for item in items {
      if cancel.is_cancelled() {
        tracing::warn!(
          committed = report.samples_created + report.samples_updated,
          "bulk ingest cancelled"
        );
        return Err(Error::Cancelled);
      }
      match self.submit(item.submission.clone()).await {
        Ok(outcome) => report.record(&outcome),
        Err(Error::Core(err)) if err.is_validation() => report.fail(&item, &err),
        Err(err) => return Err(err),
      }
    }
    report.committed = true;
    Ok(report)
  }

  async fn submit_as_unit(
    &self,
    items: Vec<BatchItem>,
    options: BatchOptions,
    cancel: CancellationToken,
  ) -> Result<BatchReport> {
    self
      .run("submit batch", move |conn, ctx| {
        let mut tx = conn.transaction()?;
        let mut report = BatchReport::default();
        for item in &items {
          if cancel.is_cancelled() {
            return Err(Error::Cancelled);
          }
          let sp = tx.savepoint()?;
          match ops::apply_submission(&sp, &item.submission, ctx) {
            Ok(outcome) => {
              sp.commit()?;
              report.record(&outcome);
            }
            Err(Error::Core(err)) if err.is_validation() => {
              drop(sp);
              report.fail(item, &err);
              if options.strict {
                // Dropping `tx` rolls back everything applied so far.
                return Ok(BatchReport {
                  errors: report.errors,
                  committed: false,
                  ..BatchReport::default()
                });
              }
            }
            Err(err) => return Err(err),
          }
        }
        tx.commit()?;
        report.committed = true;
        Ok(report)
      })
      .await
  }
}

// ─── QcStore impl ────────────────────────────────────────────────────────────

impl QcStore for SqliteStore {
  type Error = Error;

  // ── Catalog ───────────────────────────────────────────────────────────────

  async fn upsert_product(&self, product: Product) -> Result<Product> {
    let stored = product.clone();
    self
      .write("upsert product", move |conn, _| ops::upsert_product(conn, &stored))
      .await?;
    Ok(product)
  }

  async fn upsert_property(&self, property: Property) -> Result<Property> {
    self
      .write("upsert property", move |conn, _| {
        ops::upsert_property(conn, &property)
      })
      .await
  }

  async fn upsert_line(&self, line: ProductionLine) -> Result<ProductionLine> {
    let stored = line.clone();
    self
      .write("upsert line", move |conn, _| ops::upsert_line(conn, &stored))
      .await?;
    Ok(line)
  }

  async fn upsert_shift(&self, shift: Shift) -> Result<Shift> {
    let stored = shift.clone();
    self
      .write("upsert shift", move |conn, _| ops::upsert_shift(conn, &stored))
      .await?;
    Ok(shift)
  }

  async fn catalog(&self) -> Result<Catalog> {
    self.run("load catalog", |conn, _| ops::load_catalog(conn)).await
  }

  // ── Specification registry ────────────────────────────────────────────────

  async fn upsert_specification(
    &self,
    spec: NewSpecification,
  ) -> Result<Specification> {
    let created = self
      .run("upsert specification", move |conn, ctx| {
        let tx = conn.transaction()?;
        let created = ops::insert_specification(&tx, &spec, ctx.now)?;
        tx.commit()?;
        ctx.cache.invalidate(&created.product, &created.property);
        Ok(created)
      })
      .await?;
    tracing::info!(
      spec_id = %created.spec_id,
      product = %created.product,
      property = %created.property,
      effective_from = %created.effective_from,
      "specification activated"
    );
    Ok(created)
  }

  async fn get_active_specification(
    &self,
    product: String,
    property: String,
    at: Option<DateTime<Utc>>,
  ) -> Result<Option<Specification>> {
    self
      .run("get active specification", move |conn, ctx| {
        ops::specification_at(
          conn,
          ctx.cache,
          &product,
          &property,
          at.unwrap_or(ctx.now),
        )
      })
      .await
  }

  async fn specification_history(
    &self,
    product: String,
    property: String,
  ) -> Result<Vec<Specification>> {
    self
      .run("specification history", move |conn, ctx| {
        let history = ctx.cache.history(&product, &property, || {
          ops::specification_history(conn, &product, &property)
        })?;
        Ok(history.as_ref().clone())
      })
      .await
  }

  // ── Samples ───────────────────────────────────────────────────────────────

  async fn create_sample(&self, input: NewSample) -> Result<Sample> {
    let sample = self
      .write("create sample", move |conn, ctx| {
        ops::insert_sample(conn, &input, ctx)
      })
      .await?;
    tracing::info!(sample_id = %sample.sample_id, key = %sample.key, "sample created");
    Ok(sample)
  }

  async fn get_sample(&self, sample_id: Uuid) -> Result<Option<SampleView>> {
    self
      .run("get sample", move |conn, _| ops::load_view(conn, sample_id))
      .await
  }

  async fn find_sample(&self, key: SampleKey) -> Result<Option<SampleView>> {
    self
      .run("find sample", move |conn, _| {
        match ops::find_sample_id(conn, &key)? {
          Some(id) => ops::load_view(conn, id),
          None => Ok(None),
        }
      })
      .await
  }

  async fn list_samples(&self, filter: &SampleFilter) -> Result<Vec<Sample>> {
    let filter = filter.clone();
    self
      .run("list samples", move |conn, _| ops::list_samples(conn, &filter))
      .await
  }

  async fn attach_measurement(
    &self,
    sample_id: Uuid,
    input: NewMeasurement,
  ) -> Result<Measurement> {
    let _guard = self.locks.lock(sample_id).await;
    self
      .write("attach measurement", move |conn, ctx| {
        ops::attach_measurement(conn, sample_id, &input, ctx)
      })
      .await
  }

  async fn upsert_measurement(
    &self,
    sample_id: Uuid,
    input: NewMeasurement,
  ) -> Result<Measurement> {
    let _guard = self.locks.lock(sample_id).await;
    self
      .write("upsert measurement", move |conn, ctx| {
        ops::upsert_measurement(conn, sample_id, &input, ctx)
      })
      .await
  }

  async fn detach_measurement(&self, measurement_id: Uuid) -> Result<SampleView> {
    let sample_id = self
      .run("find measurement", move |conn, _| {
        ops::measurement_owner(conn, measurement_id)
      })
      .await?;
    let _guard = self.locks.lock(sample_id).await;
    self
      .write("detach measurement", move |conn, ctx| {
        ops::detach_measurement(conn, measurement_id, ctx)
      })
      .await
  }

  async fn delete_sample(&self, sample_id: Uuid) -> Result<()> {
    let guard = self.locks.lock(sample_id).await;
    self
      .write("delete sample", move |conn, _| ops::delete_sample(conn, sample_id))
      .await?;
    drop(guard);
    tracing::info!(%sample_id, "sample deleted");
    Ok(())
  }

  async fn seal(&self, sample_id: Uuid) -> Result<SampleView> {
    let _guard = self.locks.lock(sample_id).await;
    self
      .write("seal sample", move |conn, ctx| {
        ops::seal(conn, sample_id, ctx).map(|(view, _)| view)
      })
      .await
  }

  // ── Ingest ────────────────────────────────────────────────────────────────

  async fn submit(&self, submission: Submission) -> Result<IngestOutcome> {
    // An existing sample under this key is locked for the whole apply.
    let existing = match submission.sequence {
      Some(sequence) => {
        let key = SampleKey {
          date: submission.date,
          shift: submission.shift.clone(),
          line: submission.line.clone(),
          product: submission.product.clone(),
          kind: submission.kind,
          sequence,
        };
        self
          .run("find sample", move |conn, _| ops::find_sample_id(conn, &key))
          .await?
      }
      None => None,
    };
    let _guard = match existing {
      Some(id) => Some(self.locks.lock(id).await),
      None => None,
    };

    let outcome = self
      .write("submit sample", move |conn, ctx| {
        ops::apply_submission(conn, &submission, ctx)
      })
      .await?;

    let sample = &outcome.view.sample;
    tracing::info!(
      sample_id = %sample.sample_id,
      key = %sample.key,
      status = %outcome.status,
      verdict = %sample.verdict,
      "sample submitted"
    );
    if sample.verdict == Verdict::Rejected {
      tracing::warn!(sample_id = %sample.sample_id, key = %sample.key, "sample rejected");
    }
    Ok(outcome)
  }

  async fn submit_batch(
    &self,
    items: Vec<BatchItem>,
    options: BatchOptions,
    cancel: CancellationToken,
  ) -> Result<BatchReport> {
    let groups = items.len();
    let report = if options.per_row_commit && !options.strict {
      self.submit_per_group(items, cancel).await?
    } else {
      self.submit_as_unit(items, options, cancel).await?
    };
    tracing::info!(
      groups,
      created = report.samples_created,
      updated = report.samples_updated,
      unchanged = report.samples_unchanged,
      errors = report.errors.len(),
      committed = report.committed,
      "bulk ingest finished"
    );
    Ok(report)
  }

  // ── Dashboard ─────────────────────────────────────────────────────────────

  async fn dashboard_snapshot(
    &self,
    query: &DashboardQuery,
    today: NaiveDate,
  ) -> Result<Vec<SampleView>> {
    let query = query.clone();
    self
      .write("dashboard snapshot", move |conn, _| {
        ops::dashboard_views(conn, &query, today)
      })
      .await
  }
}
