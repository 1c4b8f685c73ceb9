//! Error type for `vermiqc-store-sqlite`.

use thiserror::Error;
use vermiqc_core::DomainError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{0}")]
  Core(#[from] vermiqc_core::Error),

  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored column could not be decoded into its domain type.
  #[error("decode error: {0}")]
  Decode(String),

  #[error("operation cancelled")]
  Cancelled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<tokio_rusqlite::Error> for Error {
  /// Errors raised inside a connection closure travel back boxed in
  /// `Other`; unwrap them so domain errors keep their type.
  fn from(err: tokio_rusqlite::Error) -> Self {
    match err {
      tokio_rusqlite::Error::Other(boxed) => match boxed.downcast::<Error>() {
        Ok(inner) => *inner,
        Err(other) => Error::Database(tokio_rusqlite::Error::Other(other)),
      },
      tokio_rusqlite::Error::Rusqlite(e) => Error::Sqlite(e),
      other => Error::Database(other),
    }
  }
}

impl Error {
  /// SQLite reported the database busy or locked; worth retrying.
  pub fn is_transient(&self) -> bool {
    let sqlite = match self {
      Error::Sqlite(e) => e,
      Error::Database(tokio_rusqlite::Error::Rusqlite(e)) => e,
      _ => return false,
    };
    matches!(
      sqlite.sqlite_error_code(),
      Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
  }

  /// The connection thread is gone; nothing will succeed on this store.
  pub fn is_disconnected(&self) -> bool {
    matches!(self, Error::Database(tokio_rusqlite::Error::ConnectionClosed))
  }
}

impl DomainError for Error {
  fn as_domain(&self) -> Option<&vermiqc_core::Error> {
    match self {
      Error::Core(e) => Some(e),
      _ => None,
    }
  }
}
