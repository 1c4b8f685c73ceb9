//! Per-sample async locks.
//!
//! Mutations of one sample (attach, upsert, detach, seal, delete, and
//! ingest updates) are serialised on a mutex keyed by the sample id, so a
//! retry loop for one sample never races another writer of the same sample.
//! An entry lives only while some task holds or awaits its mutex.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
pub struct SampleLocks {
  locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

/// Holds one sample's mutex; releasing it drops the map entry once no other
/// task is waiting on it.
pub struct SampleGuard<'a> {
  locks:     &'a DashMap<Uuid, Arc<Mutex<()>>>,
  sample_id: Uuid,
  guard:     Option<OwnedMutexGuard<()>>,
}

impl SampleLocks {
  pub async fn lock(&self, sample_id: Uuid) -> SampleGuard<'_> {
    let mutex = Arc::clone(
      self.locks.entry(sample_id).or_default().value(),
    );
    let guard = mutex.lock_owned().await;
    SampleGuard { locks: &self.locks, sample_id, guard: Some(guard) }
  }

  #[cfg(test)]
  fn len(&self) -> usize { self.locks.len() }
}

impl Drop for SampleGuard<'_> {
  fn drop(&mut self) {
    // Release first so our own clone no longer counts. Waiters hold clones,
    // and `entry` needs the shard lock `remove_if` is holding.
    self.guard.take();
    self
      .locks
      .remove_if(&self.sample_id, |_, mutex| Arc::strong_count(mutex) == 1);
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn same_sample_is_serialised() {
    let locks = SampleLocks::default();
    let id = Uuid::new_v4();
    let guard = locks.lock(id).await;

    let second = tokio::time::timeout(Duration::from_millis(20), locks.lock(id));
    assert!(second.await.is_err());

    drop(guard);
    let _again = locks.lock(id).await;
  }

  #[tokio::test]
  async fn different_samples_do_not_block() {
    let locks = SampleLocks::default();
    let _a = locks.lock(Uuid::new_v4()).await;
    let _b = locks.lock(Uuid::new_v4()).await;
  }

  #[tokio::test]
  async fn released_locks_leave_no_entry() {
    let locks = SampleLocks::default();
    for _ in 0..10 {
      let _guard = locks.lock(Uuid::new_v4()).await;
    }
    assert_eq!(locks.len(), 0);
  }

  #[tokio::test]
  async fn entry_survives_while_a_waiter_remains() {
    let locks = Arc::new(SampleLocks::default());
    let id = Uuid::new_v4();
    let first = locks.lock(id).await;

    let waiter = {
      let locks = Arc::clone(&locks);
      tokio::spawn(async move {
        let _guard = locks.lock(id).await;
        locks.len()
      })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(first);
    assert_eq!(locks.len(), 1);

    // The waiter saw its own entry while holding the lock.
    assert_eq!(waiter.await.unwrap(), 1);
    assert_eq!(locks.len(), 0);
  }
}
