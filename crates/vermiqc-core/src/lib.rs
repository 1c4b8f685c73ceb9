//! Core types and trait definitions for the vermiculite QC store.
//!
//! Holds the sample evaluation engine (classifier, sample aggregator,
//! dashboard builder) as pure functions, plus the [`store::QcStore`] trait
//! backends implement. Free of HTTP and database dependencies.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod catalog;
pub mod classify;
pub mod dashboard;
pub mod error;
pub mod ingest;
pub mod sample;
pub mod seal;
pub mod specification;
pub mod store;
pub mod value;
pub mod verdict;

pub use error::{DomainError, Error, Locale, Result};
