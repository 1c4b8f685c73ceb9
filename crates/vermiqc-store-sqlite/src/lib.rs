//! SQLite backend for the vermiculite QC store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each store operation is one
//! transaction; lock errors are retried with backoff before surfacing as
//! `BackendUnavailable`.

mod cache;
mod encode;
mod locks;
mod ops;
mod retry;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, StoreOptions};
