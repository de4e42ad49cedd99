//! Category tree node types.
//!
//! The tree has four levels: top-level category → sub-category → topic →
//! criterion. Every node carries a weight expressed as a fraction of 1 among
//! its siblings. Nodes are built once by the registry builder and never
//! mutated afterwards, so the whole tree is safely shareable across
//! concurrent computation runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
  expr::{Expr, Join},
  rule::ScoringRule,
};

// ─── Ids ─────────────────────────────────────────────────────────────────────

/// Id of a top-level category, e.g. `food_and_drinks`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub String);

/// Id of a sub-category, e.g. `restaurants`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubCategoryId(pub String);

/// Id of a topic — an accessibility dimension such as `mobility`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(pub String);

/// Id of a criterion — the smallest scored unit, e.g. `wheelchair_toilet`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CriterionId(pub String);

impl CategoryId {
  pub fn as_str(&self) -> &str { &self.0 }
}

impl SubCategoryId {
  pub fn as_str(&self) -> &str { &self.0 }
}

impl TopicId {
  pub fn as_str(&self) -> &str { &self.0 }
}

impl CriterionId {
  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CategoryId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl fmt::Display for SubCategoryId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl fmt::Display for TopicId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl fmt::Display for CriterionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

/// The coarsest grouping of facility types (e.g. "food and drinks").
#[derive(Debug, Clone)]
pub struct TopLevelCategory {
  pub id:             CategoryId,
  /// Fraction of 1 across all top-level categories.
  pub weight:         f64,
  /// UN sustainable-development-goal tags; informational only.
  pub sdg_tags:       Vec<String>,
  /// Planned categories are display-only and excluded from computation.
  pub planned:        bool,
  pub sub_categories: Vec<SubCategory>,
}

/// A concrete facility grouping (e.g. "restaurants") with its own facility
/// selection and topic pivots.
#[derive(Debug, Clone)]
pub struct SubCategory {
  pub id:        SubCategoryId,
  /// Fraction of 1 among sub-categories under the same parent.
  pub weight:    f64,
  pub selection: FacilitySelection,
  pub topics:    Vec<TopicPivot>,
}

/// Which facility rows a sub-category draws from.
#[derive(Debug, Clone)]
pub struct FacilitySelection {
  /// Source table (or view) name.
  pub table:        String,
  /// Values matched against the promoted `category` column.
  pub categories:   Vec<String>,
  /// Additional static predicate, ANDed with the category filter.
  pub extra_filter: Option<Expr>,
  pub joins:        Vec<Join>,
  /// Deduplication of join-multiplied rows; when non-empty the innermost
  /// select groups by these expressions before any aggregation.
  pub group_by:     Vec<Expr>,
}

impl FacilitySelection {
  /// A plain selection over `table` filtered to the given category values.
  pub fn for_categories(
    table: impl Into<String>,
    categories: Vec<String>,
  ) -> Self {
    Self {
      table: table.into(),
      categories,
      extra_filter: None,
      joins: Vec::new(),
      group_by: Vec::new(),
    }
  }
}

/// A topic (accessibility dimension) pivot within one sub-category.
#[derive(Debug, Clone)]
pub struct TopicPivot {
  pub id:       TopicId,
  pub criteria: Vec<CriterionPivot>,
}

/// A criterion pivot within one topic.
#[derive(Debug, Clone)]
pub struct CriterionPivot {
  pub id:            CriterionId,
  /// Fraction of 1 among criteria under the same topic.
  pub weight:        f64,
  /// Overrides the global rule for this criterion when set.
  pub rule_override: Option<ScoringRule>,
}
