//! Criterion scoring rules.
//!
//! A rule translates into two aggregate expressions over one sub-category's
//! facility rows: a score in [0, 100] and a data-quality expression that
//! measures how many rows carried any of the tags the rule recognizes.
//! Values above 100 are representable but discouraged; the engine never
//! clamps.

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

// ─── Tag references ──────────────────────────────────────────────────────────

/// A graded tag value with the points it awards, e.g. `yes` → 100,
/// `limited` → 50, `no` → 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagGrade {
  pub value:  String,
  pub points: f64,
}

/// One recognized key/value pair. `value: None` means any non-null value of
/// the key counts. Promoted keys are read from an indexed table column
/// maintained by the ingestion pipeline instead of the raw tag map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagMatch {
  pub key:      String,
  #[serde(default)]
  pub value:    Option<String>,
  #[serde(default)]
  pub promoted: bool,
}

impl TagMatch {
  fn key_expr(&self) -> Expr {
    if self.promoted { Expr::column(&self.key) } else { Expr::tag(&self.key) }
  }

  /// Predicate over one facility row: does it carry this tag?
  fn predicate(&self) -> Expr {
    match &self.value {
      Some(value) => self.key_expr().eq(Expr::text(value)),
      None => self.key_expr().is_not_null(),
    }
  }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// The scoring rule of one criterion family. Global rules are keyed by
/// criterion id in the registry; a [`crate::category::CriterionPivot`] may
/// carry an override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoringRule {
  /// Average of per-row points for rows whose value of `key` has a grade.
  /// Rows without a graded value are left out of the average entirely.
  GradedTag {
    key:      String,
    #[serde(default)]
    promoted: bool,
    grades:   Vec<TagGrade>,
  },

  /// Share of rows (as 0–100) matching any of the listed tags.
  PresenceShare { tags: Vec<TagMatch> },
}

impl ScoringRule {
  /// Aggregate expression producing this criterion's score.
  pub fn score_expr(&self) -> Expr {
    match self {
      Self::GradedTag { key, promoted, grades } => {
        let subject = TagMatch {
          key:      key.clone(),
          value:    None,
          promoted: *promoted,
        };
        let whens = grades
          .iter()
          .map(|grade| {
            (
              subject.key_expr().eq(Expr::text(&grade.value)),
              Expr::real(grade.points),
            )
          })
          .collect();
        // Ungraded rows fall through to NULL and are skipped by avg().
        Expr::Case { whens, otherwise: None }.avg()
      }
      Self::PresenceShare { tags } => {
        let matched = Expr::Or(tags.iter().map(TagMatch::predicate).collect());
        Expr::Case {
          whens:     vec![(matched, Expr::real(100.0))],
          otherwise: Some(Box::new(Expr::real(0.0))),
        }
        .avg()
      }
    }
  }

  /// The key/value pairs whose presence counts as data for this criterion.
  pub fn recognized_tags(&self) -> Vec<TagMatch> {
    match self {
      Self::GradedTag { key, promoted, grades } => grades
        .iter()
        .map(|grade| TagMatch {
          key:      key.clone(),
          value:    Some(grade.value.clone()),
          promoted: *promoted,
        })
        .collect(),
      Self::PresenceShare { tags } => tags.clone(),
    }
  }

  /// Data-quality expression:
  /// `coalesce(matching_rows / total_rows, 0) * (1 - min_dqf) + min_dqf`.
  ///
  /// With zero rows the division is NULL, the coalesce yields 0, and the
  /// floor keeps a fully-absent signal from ever being literally zero.
  pub fn quality_expr(&self, min_data_quality_factor: f64) -> Expr {
    let matched = Expr::Or(
      self
        .recognized_tags()
        .iter()
        .map(TagMatch::predicate)
        .collect(),
    );
    let share = Expr::Coalesce(vec![
      Expr::CountIf(Box::new(matched)).to_real().div(Expr::CountAll),
      Expr::real(0.0),
    ]);
    share
      .mul(Expr::real(1.0 - min_data_quality_factor))
      .add(Expr::real(min_data_quality_factor))
  }
}
