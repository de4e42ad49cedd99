//! Registry configuration.
//!
//! The category tree is static data, loaded once at process start. The
//! shapes below deserialize from TOML (or any serde format) and build into
//! the validated [`CategoryRegistry`]; all invariant checking lives in the
//! registry builder.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{
  Result,
  category::{
    CategoryId, CriterionId, CriterionPivot, FacilitySelection, SubCategory,
    SubCategoryId, TopLevelCategory, TopicId, TopicPivot,
  },
  registry::CategoryRegistry,
  rule::ScoringRule,
};

/// Floor for the data-quality factor so a fully-absent signal is never
/// literally zero.
pub const DEFAULT_MIN_DATA_QUALITY_FACTOR: f64 = 0.1;

pub const DEFAULT_FACILITY_TABLE: &str = "facilities";

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
  #[serde(default = "default_min_dqf")]
  pub min_data_quality_factor: f64,
  /// Global scoring rules keyed by criterion id.
  #[serde(default)]
  pub rules: BTreeMap<String, ScoringRule>,
  #[serde(default, rename = "category")]
  pub categories: Vec<CategoryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
  pub id:             String,
  pub weight:         f64,
  #[serde(default)]
  pub sdg_tags:       Vec<String>,
  #[serde(default)]
  pub planned:        bool,
  #[serde(default, rename = "sub_category")]
  pub sub_categories: Vec<SubCategoryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubCategoryConfig {
  pub id:         String,
  pub weight:     f64,
  #[serde(default = "default_table")]
  pub table:      String,
  /// Values of the promoted `category` column this sub-category draws from.
  #[serde(default)]
  pub categories: Vec<String>,
  #[serde(default, rename = "topic")]
  pub topics:     Vec<TopicConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicConfig {
  pub id:       String,
  #[serde(default, rename = "criterion")]
  pub criteria: Vec<CriterionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CriterionConfig {
  pub id:     String,
  pub weight: f64,
  /// Criterion-specific override of the global rule.
  #[serde(default)]
  pub rule:   Option<ScoringRule>,
}

fn default_min_dqf() -> f64 { DEFAULT_MIN_DATA_QUALITY_FACTOR }

fn default_table() -> String { DEFAULT_FACILITY_TABLE.to_owned() }

impl RegistryConfig {
  /// Build the validated registry; fails fast on any invariant violation.
  pub fn build(self) -> Result<CategoryRegistry> {
    let mut builder = CategoryRegistry::builder()
      .min_data_quality_factor(self.min_data_quality_factor);

    for (id, rule) in self.rules {
      builder = builder.rule(CriterionId(id), rule);
    }

    for category in self.categories {
      builder = builder.category(TopLevelCategory {
        id:             CategoryId(category.id),
        weight:         category.weight,
        sdg_tags:       category.sdg_tags,
        planned:        category.planned,
        sub_categories: category
          .sub_categories
          .into_iter()
          .map(|sub| SubCategory {
            id:        SubCategoryId(sub.id),
            weight:    sub.weight,
            selection: FacilitySelection::for_categories(sub.table, sub.categories),
            topics:    sub
              .topics
              .into_iter()
              .map(|topic| TopicPivot {
                id:       TopicId(topic.id),
                criteria: topic
                  .criteria
                  .into_iter()
                  .map(|criterion| CriterionPivot {
                    id:            CriterionId(criterion.id),
                    weight:        criterion.weight,
                    rule_override: criterion.rule,
                  })
                  .collect(),
              })
              .collect(),
          })
          .collect(),
      });
    }

    builder.build()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EXAMPLE: &str = r#"
    min_data_quality_factor = 0.1

    [rules.wheelchair_entrance]
    kind = "graded_tag"
    key = "wheelchair"
    promoted = true
    grades = [
      { value = "yes", points = 100 },
      { value = "limited", points = 50 },
      { value = "no", points = 0 },
    ]

    [rules.wheelchair_toilet]
    kind = "presence_share"
    tags = [{ key = "toilets:wheelchair", value = "yes" }]

    [[category]]
    id = "food_and_drinks"
    weight = 1.0
    sdg_tags = ["sdg-11"]

    [[category.sub_category]]
    id = "restaurants"
    weight = 1.0
    categories = ["restaurant", "cafe", "bar"]

    [[category.sub_category.topic]]
    id = "mobility"

    [[category.sub_category.topic.criterion]]
    id = "wheelchair_entrance"
    weight = 0.7

    [[category.sub_category.topic.criterion]]
    id = "wheelchair_toilet"
    weight = 0.3
  "#;

  #[test]
  fn example_config_parses_and_builds() {
    let config: RegistryConfig = toml::from_str(EXAMPLE).unwrap();
    let registry = config.build().unwrap();

    registry.check_weight_sums(1e-10).unwrap();

    let sub = registry
      .sub_category(&SubCategoryId("restaurants".into()))
      .unwrap();
    assert_eq!(sub.selection.categories.len(), 3);
    assert_eq!(sub.topics[0].criteria.len(), 2);
  }

  #[test]
  fn rule_override_replaces_the_global_rule() {
    let config: RegistryConfig = toml::from_str(
      r#"
      [rules.entrance]
      kind = "presence_share"
      tags = [{ key = "wheelchair", promoted = true }]

      [[category]]
      id = "a"
      weight = 1.0

      [[category.sub_category]]
      id = "shops"
      weight = 1.0
      categories = ["shop"]

      [[category.sub_category.topic]]
      id = "mobility"

      [[category.sub_category.topic.criterion]]
      id = "entrance"
      weight = 1.0
      rule = { kind = "graded_tag", key = "wheelchair", promoted = true, grades = [{ value = "yes", points = 100 }] }
      "#,
    )
    .unwrap();

    let registry = config.build().unwrap();
    let sub = registry.sub_category(&SubCategoryId("shops".into())).unwrap();
    let pivot = &sub.topics[0].criteria[0];
    assert!(matches!(registry.rule_for(pivot), ScoringRule::GradedTag { .. }));
  }

  #[test]
  fn missing_floor_defaults() {
    let config: RegistryConfig = toml::from_str("").unwrap();
    assert_eq!(config.min_data_quality_factor, DEFAULT_MIN_DATA_QUALITY_FACTOR);
  }
}
