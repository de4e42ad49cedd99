//! Roll-up of extracted query results into a score tree.
//!
//! The engine extracts the numeric columns of each composed query's result
//! row into [`ExtractedSubCategory`] values; everything from there on is a
//! pure function. Topic and criterion scores arrive pre-combined from the
//! query; this module derives their data-quality factors and combines
//! sub-categories into top-level categories and the overall score, all
//! through the one [`crate::aggregate`] primitive.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  aggregate::{AggregateOptions, ScoreEntry, aggregate, round3},
  category::{CriterionId, SubCategoryId, TopicId},
  registry::CategoryRegistry,
  score::{CriterionScore, ScoreTree, SubCategoryScore, TopLevelScore, TopicScore},
};

// ─── Extracted query results ─────────────────────────────────────────────────

/// Values read from one composed query's single result row.
#[derive(Debug, Clone)]
pub struct ExtractedSubCategory {
  pub sub_category: SubCategoryId,
  pub score:        Option<f64>,
  pub rows_matched: i64,
  pub topics:       Vec<ExtractedTopic>,
}

#[derive(Debug, Clone)]
pub struct ExtractedTopic {
  pub topic:    TopicId,
  pub score:    Option<f64>,
  pub criteria: Vec<ExtractedCriterion>,
}

#[derive(Debug, Clone)]
pub struct ExtractedCriterion {
  pub criterion:    CriterionId,
  pub weight:       f64,
  pub score:        Option<f64>,
  pub data_quality: f64,
}

// ─── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct RollupOptions {
  /// Applied at the top-level and overall combinations; the unadjusted
  /// score is reported on those nodes when enabled.
  pub adjust_weights_by_data_quality: bool,
}

// ─── Sub-category resolution ─────────────────────────────────────────────────

/// Derive topic and sub-category data-quality factors for one extracted
/// sub-category. Scores are taken as the query computed them.
pub fn resolve_sub_category(
  extracted: ExtractedSubCategory,
  min_data_quality_factor: f64,
) -> SubCategoryScore {
  let quality_options = AggregateOptions {
    min_data_quality_factor,
    ..AggregateOptions::default()
  };

  let topics: Vec<TopicScore> = extracted
    .topics
    .into_iter()
    .map(|topic| {
      let entries: Vec<ScoreEntry> = topic
        .criteria
        .iter()
        .map(|c| ScoreEntry {
          score:        c.score,
          data_quality: Some(c.data_quality),
          weight:       Some(c.weight),
        })
        .collect();
      let combined = aggregate(&entries, &quality_options);

      TopicScore {
        id:           topic.topic,
        score:        topic.score.map(as_score),
        data_quality: combined.data_quality,
        criteria:     topic
          .criteria
          .into_iter()
          .map(|c| CriterionScore {
            id:           c.criterion,
            score:        c.score.map(as_score),
            data_quality: round3(c.data_quality),
          })
          .collect(),
      }
    })
    .collect();

  // "Exactly absent": no facility row matched the filter at all. The
  // data-quality factor is withheld so the parent roll-up can exclude the
  // branch rather than average in the floor.
  let data_quality = if extracted.rows_matched == 0 {
    None
  } else {
    let entries: Vec<ScoreEntry> = topics
      .iter()
      .map(|t| ScoreEntry {
        score:        t.score.map(|s| s as f64),
        data_quality: Some(t.data_quality),
        weight:       None,
      })
      .collect();
    Some(aggregate(&entries, &quality_options).data_quality)
  };

  SubCategoryScore {
    id: extracted.sub_category,
    score: extracted.score.map(as_score),
    data_quality,
    rows_matched: extracted.rows_matched,
    topics,
  }
}

// ─── Tree roll-up ────────────────────────────────────────────────────────────

/// Combine resolved sub-categories into top-level categories and the
/// overall score. `subs` must contain one entry per sub-category of every
/// non-planned category in `registry`.
pub fn roll_up(
  registry: &CategoryRegistry,
  admin_area_id: Uuid,
  computed_at: DateTime<Utc>,
  subs: Vec<SubCategoryScore>,
  options: &RollupOptions,
) -> ScoreTree {
  let min_dqf = registry.min_data_quality_factor();
  let combine_options = AggregateOptions {
    adjust_weights_by_data_quality: options.adjust_weights_by_data_quality,
    min_data_quality_factor: min_dqf,
    ..AggregateOptions::default()
  };

  let mut by_id: std::collections::HashMap<SubCategoryId, SubCategoryScore> =
    subs.into_iter().map(|s| (s.id.clone(), s)).collect();

  let mut categories = Vec::new();
  for category in registry.categories().iter().filter(|c| !c.planned) {
    let sub_categories: Vec<SubCategoryScore> = category
      .sub_categories
      .iter()
      .filter_map(|sub| by_id.remove(&sub.id))
      .collect();

    // An absent sub-category carries a null score, so it drops out of both
    // the numerator and the renormalizing weight sum; its floored data
    // quality still averages in.
    let entries: Vec<ScoreEntry> = sub_categories
      .iter()
      .map(|sub| {
        let weight = registry
          .sub_category(&sub.id)
          .map(|node| node.weight)
          .unwrap_or(1.0);
        ScoreEntry {
          score:        sub.score.map(|s| s as f64),
          data_quality: Some(sub.data_quality.unwrap_or(min_dqf)),
          weight:       Some(weight),
        }
      })
      .collect();
    let combined = aggregate(&entries, &combine_options);

    categories.push(TopLevelScore {
      id:               category.id.clone(),
      score:            combined.score,
      unadjusted_score: combined.unadjusted_score,
      data_quality:     combined.data_quality,
      sub_categories,
    });
  }

  let entries: Vec<ScoreEntry> = categories
    .iter()
    .map(|cat| {
      let weight = registry
        .category(&cat.id)
        .map(|node| node.weight)
        .unwrap_or(1.0);
      ScoreEntry {
        score:        cat.score.map(|s| s as f64),
        data_quality: Some(cat.data_quality),
        weight:       Some(weight),
      }
    })
    .collect();
  let overall = aggregate(&entries, &combine_options);

  ScoreTree {
    admin_area_id,
    computed_at,
    score: overall.score,
    unadjusted_score: overall.unadjusted_score,
    data_quality: overall.data_quality,
    categories,
  }
}

/// Query scores arrive as REAL columns holding already-ceiled integers.
fn as_score(value: f64) -> i64 { value.ceil() as i64 }

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    category::{
      CategoryId, CriterionPivot, FacilitySelection, SubCategory, TopLevelCategory,
      TopicPivot,
    },
    rule::{ScoringRule, TagMatch},
  };

  fn presence_rule() -> ScoringRule {
    ScoringRule::PresenceShare {
      tags: vec![TagMatch { key: "wheelchair".into(), value: None, promoted: true }],
    }
  }

  fn sub_node(id: &str, weight: f64) -> SubCategory {
    SubCategory {
      id:        SubCategoryId(id.into()),
      weight,
      selection: FacilitySelection::for_categories("facilities", vec![id.into()]),
      topics:    vec![TopicPivot {
        id:       TopicId("mobility".into()),
        criteria: vec![CriterionPivot {
          id:            CriterionId("entrance".into()),
          weight:        1.0,
          rule_override: None,
        }],
      }],
    }
  }

  fn registry() -> CategoryRegistry {
    CategoryRegistry::builder()
      .min_data_quality_factor(0.1)
      .rule(CriterionId("entrance".into()), presence_rule())
      .category(TopLevelCategory {
        id:             CategoryId("transport".into()),
        weight:         1.0,
        sdg_tags:       vec![],
        planned:        false,
        sub_categories: vec![sub_node("trains", 0.5), sub_node("ferries", 0.5)],
      })
      .build()
      .unwrap()
  }

  fn extracted(id: &str, score: Option<f64>, rows: i64, dqf: f64) -> ExtractedSubCategory {
    ExtractedSubCategory {
      sub_category: SubCategoryId(id.into()),
      score,
      rows_matched: rows,
      topics: vec![ExtractedTopic {
        topic:    TopicId("mobility".into()),
        score,
        criteria: vec![ExtractedCriterion {
          criterion:    CriterionId("entrance".into()),
          weight:       1.0,
          score,
          data_quality: dqf,
        }],
      }],
    }
  }

  fn resolved(id: &str, score: Option<f64>, rows: i64, dqf: f64) -> SubCategoryScore {
    resolve_sub_category(extracted(id, score, rows, dqf), 0.1)
  }

  #[test]
  fn missing_branch_is_excluded_not_penalized() {
    let registry = registry();
    let area = Uuid::new_v4();
    let now = Utc::now();

    // Ferries absent entirely (landlocked city): the trains score carries
    // the whole top-level weight.
    let tree = roll_up(
      &registry,
      area,
      now,
      vec![
        resolved("trains", Some(80.0), 12, 0.9),
        resolved("ferries", None, 0, 0.1),
      ],
      &RollupOptions::default(),
    );

    let transport = &tree.categories[0];
    assert_eq!(transport.score, Some(80));
    assert_eq!(tree.score, Some(80));

    // Without renormalization the branch would be penalized instead of
    // excluded: ceil(0.5 * 80) = 40.
    let penalized = (0.5f64 * 80.0).ceil() as i64;
    assert!(transport.score.unwrap() > penalized);
  }

  #[test]
  fn absent_branch_still_lowers_data_quality() {
    let registry = registry();
    let tree = roll_up(
      &registry,
      Uuid::new_v4(),
      Utc::now(),
      vec![
        resolved("trains", Some(80.0), 12, 0.9),
        resolved("ferries", None, 0, 0.1),
      ],
      &RollupOptions::default(),
    );

    // Sub-category quality: trains 0.9, ferries floored at 0.1, equal
    // weights.
    assert_eq!(tree.categories[0].data_quality, 0.5);
  }

  #[test]
  fn all_branches_absent_yield_null_scores() {
    let registry = registry();
    let tree = roll_up(
      &registry,
      Uuid::new_v4(),
      Utc::now(),
      vec![
        resolved("trains", None, 0, 0.1),
        resolved("ferries", None, 0, 0.1),
      ],
      &RollupOptions::default(),
    );

    assert_eq!(tree.categories[0].score, None);
    assert_eq!(tree.score, None);
    assert_eq!(tree.data_quality, 0.1);
  }

  #[test]
  fn zero_rows_withholds_sub_category_quality() {
    let sub = resolved("ferries", None, 0, 0.1);
    assert_eq!(sub.data_quality, None);
    assert_eq!(sub.rows_matched, 0);
    assert_eq!(sub.score, None);
  }

  #[test]
  fn topic_quality_is_the_weighted_mean_of_its_criteria() {
    let extracted = ExtractedSubCategory {
      sub_category: SubCategoryId("trains".into()),
      score:        Some(70.0),
      rows_matched: 5,
      topics:       vec![ExtractedTopic {
        topic:    TopicId("mobility".into()),
        score:    Some(70.0),
        criteria: vec![
          ExtractedCriterion {
            criterion:    CriterionId("entrance".into()),
            weight:       0.5,
            score:        Some(80.0),
            data_quality: 0.8,
          },
          ExtractedCriterion {
            criterion:    CriterionId("toilet".into()),
            weight:       0.5,
            score:        Some(60.0),
            data_quality: 0.4,
          },
        ],
      }],
    };

    let sub = resolve_sub_category(extracted, 0.1);
    assert_eq!(sub.topics[0].data_quality, 0.6);
    assert_eq!(sub.data_quality, Some(0.6));
  }

  #[test]
  fn adjustment_reports_unadjusted_scores_at_the_top() {
    let registry = registry();
    let tree = roll_up(
      &registry,
      Uuid::new_v4(),
      Utc::now(),
      vec![
        resolved("trains", Some(100.0), 10, 1.0),
        resolved("ferries", Some(50.0), 10, 0.5),
      ],
      &RollupOptions { adjust_weights_by_data_quality: true },
    );

    let transport = &tree.categories[0];
    // Unadjusted: ceil((100 + 50) / 2) = 75. Adjusted tilts toward the
    // better-covered sibling: ceil((1.0*100 + 0.5*50) / 1.5) = 84.
    assert_eq!(transport.unadjusted_score, Some(75));
    assert_eq!(transport.score, Some(84));
    assert!(tree.unadjusted_score.is_some());
  }
}
