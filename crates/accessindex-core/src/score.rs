//! Computed score-tree value types.
//!
//! A score tree is produced by one computation run and never mutated; the
//! persistence layer writes it as an immutable run plus one record per node.
//! Scores are ceiling-rounded integers in 0–100 (values above 100 are
//! representable but discouraged); data-quality factors are 0–1 floats at
//! 3-decimal precision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::category::{CategoryId, CriterionId, SubCategoryId, TopicId};

/// The full result of one computation run for one admin area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTree {
  pub admin_area_id:    Uuid,
  pub computed_at:      DateTime<Utc>,
  /// `None` when every top-level category was without data.
  pub score:            Option<i64>,
  /// Present only when weights were adjusted by data quality.
  pub unadjusted_score: Option<i64>,
  pub data_quality:     f64,
  pub categories:       Vec<TopLevelScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopLevelScore {
  pub id:               CategoryId,
  pub score:            Option<i64>,
  pub unadjusted_score: Option<i64>,
  pub data_quality:     f64,
  pub sub_categories:   Vec<SubCategoryScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubCategoryScore {
  pub id:           SubCategoryId,
  pub score:        Option<i64>,
  /// `None` when no facility row matched at all ("exactly absent") —
  /// the parent roll-up then excludes this branch from renormalization.
  pub data_quality: Option<f64>,
  pub rows_matched: i64,
  pub topics:       Vec<TopicScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicScore {
  pub id:           TopicId,
  pub score:        Option<i64>,
  pub data_quality: f64,
  pub criteria:     Vec<CriterionScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
  pub id:           CriterionId,
  pub score:        Option<i64>,
  pub data_quality: f64,
}

impl ScoreTree {
  /// Structural equality ignoring the computation timestamp — two runs over
  /// identical data are identical by this measure.
  pub fn same_scores(&self, other: &ScoreTree) -> bool {
    self.admin_area_id == other.admin_area_id
      && self.score == other.score
      && self.unadjusted_score == other.unadjusted_score
      && self.data_quality == other.data_quality
      && self.categories == other.categories
  }
}
