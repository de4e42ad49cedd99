//! The category registry — an immutable, validated tree.
//!
//! Built once at process start from static configuration. The builder fails
//! fast on duplicate ids, empty topic/criterion lists, missing scoring
//! rules, alias collisions, and an out-of-range data-quality floor, so a
//! malformed tree never reaches query composition. Weight sums are a
//! test-time invariant checked by [`CategoryRegistry::check_weight_sums`];
//! runtime roll-up renormalizes regardless.

use std::collections::HashMap;

use crate::{
  Error, Result, alias,
  category::{
    CategoryId, CriterionId, CriterionPivot, SubCategory, SubCategoryId,
    TopLevelCategory,
  },
  rule::ScoringRule,
};

// ─── Registry ────────────────────────────────────────────────────────────────

/// Read-only after construction; trivially shareable across parallel
/// computation workers.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
  categories:              Vec<TopLevelCategory>,
  rules:                   HashMap<CriterionId, ScoringRule>,
  sub_parent:              HashMap<SubCategoryId, CategoryId>,
  min_data_quality_factor: f64,
}

impl CategoryRegistry {
  pub fn builder() -> RegistryBuilder { RegistryBuilder::default() }

  /// Top-level categories in configuration order, planned ones included.
  pub fn categories(&self) -> &[TopLevelCategory] { &self.categories }

  pub fn category(&self, id: &CategoryId) -> Option<&TopLevelCategory> {
    self.categories.iter().find(|c| &c.id == id)
  }

  pub fn sub_category(&self, id: &SubCategoryId) -> Option<&SubCategory> {
    let parent = self.sub_parent.get(id)?;
    self
      .category(parent)?
      .sub_categories
      .iter()
      .find(|s| &s.id == id)
  }

  pub fn parent_of(&self, id: &SubCategoryId) -> Option<&CategoryId> {
    self.sub_parent.get(id)
  }

  /// The effective rule of a pivot: its override, or the global rule.
  /// Guaranteed present by the builder.
  pub fn rule_for<'a>(&'a self, pivot: &'a CriterionPivot) -> &'a ScoringRule {
    pivot
      .rule_override
      .as_ref()
      .or_else(|| self.rules.get(&pivot.id))
      .unwrap_or_else(|| unreachable!("builder validated rule presence for {}", pivot.id))
  }

  pub fn min_data_quality_factor(&self) -> f64 { self.min_data_quality_factor }

  /// Verify that every sibling set's weights sum to 1 within `tolerance`.
  ///
  /// Planned top-level categories are excluded — they take no part in
  /// computation. Exercised by configuration tests and by the CLI at
  /// startup, never during roll-up.
  pub fn check_weight_sums(&self, tolerance: f64) -> Result<()> {
    let top: f64 = self
      .categories
      .iter()
      .filter(|c| !c.planned)
      .map(|c| c.weight)
      .sum();
    check_sum("top-level categories", top, tolerance)?;

    for category in &self.categories {
      let sum: f64 = category.sub_categories.iter().map(|s| s.weight).sum();
      check_sum(category.id.as_str(), sum, tolerance)?;

      for sub in &category.sub_categories {
        for topic in &sub.topics {
          let sum: f64 = topic.criteria.iter().map(|c| c.weight).sum();
          check_sum(topic.id.as_str(), sum, tolerance)?;
        }
      }
    }
    Ok(())
  }
}

fn check_sum(parent: &str, sum: f64, tolerance: f64) -> Result<()> {
  if (sum - 1.0).abs() > tolerance {
    return Err(Error::WeightSum { parent: parent.to_owned(), sum });
  }
  Ok(())
}

// ─── Builder ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RegistryBuilder {
  categories:              Vec<TopLevelCategory>,
  rules:                   HashMap<CriterionId, ScoringRule>,
  min_data_quality_factor: f64,
}

impl Default for RegistryBuilder {
  fn default() -> Self {
    Self {
      categories:              Vec::new(),
      rules:                   HashMap::new(),
      min_data_quality_factor: crate::config::DEFAULT_MIN_DATA_QUALITY_FACTOR,
    }
  }
}

impl RegistryBuilder {
  pub fn min_data_quality_factor(mut self, floor: f64) -> Self {
    self.min_data_quality_factor = floor;
    self
  }

  /// Register a global scoring rule for a criterion id.
  pub fn rule(mut self, id: CriterionId, rule: ScoringRule) -> Self {
    self.rules.insert(id, rule);
    self
  }

  pub fn category(mut self, category: TopLevelCategory) -> Self {
    self.categories.push(category);
    self
  }

  pub fn build(self) -> Result<CategoryRegistry> {
    if self.min_data_quality_factor <= 0.0 || self.min_data_quality_factor >= 1.0 {
      return Err(Error::InvalidDataQualityFloor(self.min_data_quality_factor));
    }

    let mut category_ids = HashMap::new();
    let mut sub_parent: HashMap<SubCategoryId, CategoryId> = HashMap::new();
    // Alias → logical path, for the collision check.
    let mut aliases: HashMap<String, String> = HashMap::new();

    for category in &self.categories {
      if category_ids.insert(category.id.clone(), ()).is_some() {
        return Err(Error::DuplicateCategory(category.id.to_string()));
      }

      for sub in &category.sub_categories {
        if sub_parent.insert(sub.id.clone(), category.id.clone()).is_some() {
          return Err(Error::DuplicateSubCategory(sub.id.to_string()));
        }
        if sub.topics.is_empty() {
          return Err(Error::EmptyTopics(sub.id.to_string()));
        }

        claim(&mut aliases, alias::sub_category_score(&sub.id), format!("sc/{}", sub.id))?;
        claim(&mut aliases, alias::sub_category_rows(&sub.id), format!("sc/{}/rows", sub.id))?;

        let mut topic_ids = HashMap::new();
        for topic in &sub.topics {
          if topic_ids.insert(topic.id.clone(), ()).is_some() {
            return Err(Error::DuplicateTopic {
              sub_category: sub.id.to_string(),
              topic:        topic.id.to_string(),
            });
          }
          if topic.criteria.is_empty() {
            return Err(Error::EmptyCriteria(topic.id.to_string()));
          }

          claim(
            &mut aliases,
            alias::topic_score(&sub.id, &topic.id),
            format!("t/{}/{}", sub.id, topic.id),
          )?;

          let mut criterion_ids = HashMap::new();
          for criterion in &topic.criteria {
            if criterion_ids.insert(criterion.id.clone(), ()).is_some() {
              return Err(Error::DuplicateCriterion {
                topic:     topic.id.to_string(),
                criterion: criterion.id.to_string(),
              });
            }
            if criterion.rule_override.is_none() && !self.rules.contains_key(&criterion.id) {
              return Err(Error::MissingRule(criterion.id.to_string()));
            }

            let path = format!("{}/{}/{}", sub.id, topic.id, criterion.id);
            claim(
              &mut aliases,
              alias::criterion_score(&sub.id, &topic.id, &criterion.id),
              path.clone(),
            )?;
            claim(
              &mut aliases,
              alias::criterion_quality(&sub.id, &topic.id, &criterion.id),
              format!("{path}/dqf"),
            )?;
          }
        }
      }
    }

    Ok(CategoryRegistry {
      categories: self.categories,
      rules: self.rules,
      sub_parent,
      min_data_quality_factor: self.min_data_quality_factor,
    })
  }
}

fn claim(aliases: &mut HashMap<String, String>, alias: String, path: String) -> Result<()> {
  if let Some(first) = aliases.insert(alias.clone(), path.clone()) {
    return Err(Error::AliasCollision { alias, first, second: path });
  }
  Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
