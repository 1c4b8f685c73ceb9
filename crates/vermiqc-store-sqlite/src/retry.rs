//! Exponential backoff for transient lock errors.
//!
//! Busy/locked errors are retried starting at 10 ms, doubling up to 1 s per
//! wait, until the configured ceiling has elapsed. Then, or as soon as the
//! connection thread is gone, the caller sees `BackendUnavailable`. Every
//! other error is returned on the first attempt.

use std::{
  future::Future,
  time::{Duration, Instant},
};

use crate::{Error, Result};

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

pub async fn with_backoff<F, Fut, T>(
  operation: &str,
  ceiling: Duration,
  mut attempt_fn: F,
) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let started = Instant::now();
  let mut backoff = INITIAL_BACKOFF;
  let mut attempt = 0u32;

  loop {
    attempt += 1;
    let err = match attempt_fn().await {
      Ok(value) => {
        if attempt > 1 {
          tracing::debug!(
            operation,
            attempt,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "database operation succeeded after retry"
          );
        }
        return Ok(value);
      }
      Err(err) => err,
    };

    if err.is_disconnected() {
      tracing::error!(operation, "database connection closed");
      return Err(unavailable(err));
    }
    if !err.is_transient() {
      return Err(err);
    }

    let elapsed = started.elapsed();
    if elapsed >= ceiling {
      tracing::error!(
        operation,
        attempt,
        elapsed_ms = elapsed.as_millis() as u64,
        "database still locked, giving up"
      );
      return Err(unavailable(err));
    }

    let wait = backoff.min(ceiling - elapsed);
    tracing::warn!(
      operation,
      attempt,
      backoff_ms = wait.as_millis() as u64,
      "database locked, retrying"
    );
    tokio::time::sleep(wait).await;
    backoff = (backoff * 2).min(MAX_BACKOFF);
  }
}

fn unavailable(err: Error) -> Error {
  Error::Core(vermiqc_core::Error::BackendUnavailable(err.to_string()))
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use super::*;

  fn busy() -> Error {
    Error::Sqlite(rusqlite::Error::SqliteFailure(
      rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
      None,
    ))
  }

  #[tokio::test]
  async fn transient_errors_are_retried() {
    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let result = with_backoff("test", Duration::from_secs(1), move || async move {
      if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
        Err(busy())
      } else {
        Ok(7)
      }
    })
    .await;
    assert_eq!(result.unwrap(), 7);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn ceiling_maps_to_backend_unavailable() {
    let err = with_backoff("test", Duration::from_millis(30), || async {
      Err::<(), _>(busy())
    })
    .await
    .unwrap_err();
    assert!(matches!(
      err,
      Error::Core(vermiqc_core::Error::BackendUnavailable(_))
    ));
  }

  #[tokio::test]
  async fn other_errors_fail_immediately() {
    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let err = with_backoff("test", Duration::from_secs(1), move || async move {
      attempts.fetch_add(1, Ordering::SeqCst);
      Err::<(), _>(Error::Decode("bad".into()))
    })
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn closed_connection_is_unavailable_at_once() {
    let err = with_backoff("test", Duration::from_secs(1), || async {
      Err::<(), _>(Error::Database(tokio_rusqlite::Error::ConnectionClosed))
    })
    .await
    .unwrap_err();
    assert!(matches!(
      err,
      Error::Core(vermiqc_core::Error::BackendUnavailable(_))
    ));
  }
}
