//! Error types for `accessindex-core`.
//!
//! Everything here is a configuration error: the registry builder fails fast
//! so that a bad tree never reaches query composition. Missing data at
//! runtime is not an error (see the roll-up rules in [`crate::rollup`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("duplicate top-level category id: {0}")]
  DuplicateCategory(String),

  #[error("duplicate sub-category id: {0}")]
  DuplicateSubCategory(String),

  #[error("duplicate topic id {topic:?} under sub-category {sub_category:?}")]
  DuplicateTopic {
    sub_category: String,
    topic:        String,
  },

  #[error("duplicate criterion id {criterion:?} under topic {topic:?}")]
  DuplicateCriterion { topic: String, criterion: String },

  #[error("sub-category {0:?} has no topics")]
  EmptyTopics(String),

  #[error("topic {0:?} has no criteria")]
  EmptyCriteria(String),

  #[error("criterion {0:?} has neither a global scoring rule nor an override")]
  MissingRule(String),

  /// Two distinct logical paths mapped to the same truncated column alias.
  /// Prevented by construction; if it fires anyway it is a fatal bug, never
  /// a recoverable runtime condition.
  #[error("column alias collision: {alias:?} generated for both {first:?} and {second:?}")]
  AliasCollision {
    alias:  String,
    first:  String,
    second: String,
  },

  #[error("min_data_quality_factor must be in (0, 1), got {0}")]
  InvalidDataQualityFloor(f64),

  #[error("sibling weights under {parent:?} sum to {sum}, expected 1")]
  WeightSum { parent: String, sum: f64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
