//! Read-through cache of specification history per `(product, property)`.
//!
//! Only touched from inside connection closures, which `tokio_rusqlite` runs
//! one at a time on the connection thread. A fill and an invalidation can
//! therefore never interleave, and a history is never cached from a
//! transaction that has not committed its specification change.

use std::sync::Arc;

use dashmap::DashMap;
use vermiqc_core::specification::{Specification, active_at};

use crate::Result;

type Pair = (String, String);

#[derive(Default)]
pub struct SpecCache {
  histories: DashMap<Pair, Arc<Vec<Specification>>>,
}

impl SpecCache {
  /// History for the pair, newest first, loading it with `load` on a miss.
  pub fn history<F>(
    &self,
    product: &str,
    property: &str,
    load: F,
  ) -> Result<Arc<Vec<Specification>>>
  where
    F: FnOnce() -> Result<Vec<Specification>>,
  {
    let key = (product.to_owned(), property.to_owned());
    if let Some(hit) = self.histories.get(&key) {
      return Ok(Arc::clone(hit.value()));
    }
    let history = Arc::new(load()?);
    self.histories.insert(key, Arc::clone(&history));
    Ok(history)
  }

  /// The specification covering `at`, loading the history on a miss.
  pub fn active_at<F>(
    &self,
    product: &str,
    property: &str,
    at: chrono::DateTime<chrono::Utc>,
    load: F,
  ) -> Result<Option<Specification>>
  where
    F: FnOnce() -> Result<Vec<Specification>>,
  {
    let history = self.history(product, property, load)?;
    Ok(active_at(&history, at).cloned())
  }

  pub fn invalidate(&self, product: &str, property: &str) {
    self
      .histories
      .remove(&(product.to_owned(), property.to_owned()));
  }
}
