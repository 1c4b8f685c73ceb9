//! Error types for the vermiqc-csv codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("CSV header is missing required column {0:?}")]
  MissingColumn(&'static str),

  #[error("CSV error: {0}")]
  Csv(#[from] csv::Error),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
