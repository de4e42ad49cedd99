//! Error type for `accessindex-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] accessindex_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A composed query's result row lacked a column the composer recorded.
  /// Indicates an engine bug, not bad data.
  #[error("composed query row is missing column {0:?}")]
  MissingColumn(String),

  #[error("unknown node level: {0:?}")]
  UnknownNodeLevel(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
