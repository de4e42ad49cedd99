//! Computation engine: compose, execute, extract, roll up, persist.
//!
//! One call per sub-category of every non-planned category; everything after
//! the row comes back is delegated to the pure roll-up in
//! [`accessindex_core::rollup`].

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use accessindex_core::{
  compose::{GeoFilter, SubCategoryQuery, compose_sub_category},
  registry::CategoryRegistry,
  rollup::{
    ExtractedCriterion, ExtractedSubCategory, ExtractedTopic, RollupOptions,
    resolve_sub_category, roll_up,
  },
  score::ScoreTree,
};

use crate::{Error, Result, encode::encode_uuid, store::SqliteScoreStore};

/// Knobs for one computation run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeOptions {
  /// Weight top-level branches by their data quality and report the
  /// unadjusted score alongside.
  pub adjust_weights_by_data_quality: bool,
}

/// Compute the full score tree for one admin area. Pure with respect to the
/// store: nothing is written.
pub async fn compute_score(
  store: &SqliteScoreStore,
  registry: &CategoryRegistry,
  admin_area_id: Uuid,
  options: &ComputeOptions,
) -> Result<ScoreTree> {
  let filter = GeoFilter::admin_area(encode_uuid(admin_area_id));
  let min_dqf = registry.min_data_quality_factor();

  let mut subs = Vec::new();
  for category in registry.categories().iter().filter(|c| !c.planned) {
    for sub in &category.sub_categories {
      let query = compose_sub_category(registry, sub, &filter);
      let row = store.query_composed(query.select.render()).await?;
      let extracted = extract_sub_category(&query, &row)?;

      tracing::debug!(
        admin_area = %admin_area_id,
        sub_category = %extracted.sub_category,
        rows = extracted.rows_matched,
        score = ?extracted.score,
        "executed sub-category query"
      );

      subs.push(resolve_sub_category(extracted, min_dqf));
    }
  }

  Ok(roll_up(
    registry,
    admin_area_id,
    Utc::now(),
    subs,
    &RollupOptions {
      adjust_weights_by_data_quality: options.adjust_weights_by_data_quality,
    },
  ))
}

/// Compute and atomically persist one run, returning the tree and its run id.
pub async fn compute_and_persist(
  store: &SqliteScoreStore,
  registry: &CategoryRegistry,
  admin_area_id: Uuid,
  options: &ComputeOptions,
) -> Result<(ScoreTree, Uuid)> {
  let tree = compute_score(store, registry, admin_area_id, options).await?;
  let run_id = store.persist_run(&tree).await?;
  Ok((tree, run_id))
}

// ─── Row extraction ──────────────────────────────────────────────────────────

/// Read the composed query's result row back through the aliases the
/// composer recorded.
fn extract_sub_category(
  query: &SubCategoryQuery,
  row: &HashMap<String, Option<f64>>,
) -> Result<ExtractedSubCategory> {
  let topics = query
    .topics
    .iter()
    .map(|topic| {
      let criteria = topic
        .criteria
        .iter()
        .map(|criterion| {
          Ok(ExtractedCriterion {
            criterion:    criterion.criterion.clone(),
            weight:       criterion.weight,
            score:        column(row, &criterion.score_alias)?,
            data_quality: column(row, &criterion.quality_alias)?.unwrap_or(0.0),
          })
        })
        .collect::<Result<Vec<_>>>()?;

      Ok(ExtractedTopic {
        topic: topic.topic.clone(),
        score: column(row, &topic.score_alias)?,
        criteria,
      })
    })
    .collect::<Result<Vec<_>>>()?;

  Ok(ExtractedSubCategory {
    sub_category: query.sub_category.clone(),
    score: column(row, &query.score_alias)?,
    // count(*) is never NULL.
    rows_matched: column(row, &query.rows_alias)?.unwrap_or(0.0) as i64,
    topics,
  })
}

fn column(row: &HashMap<String, Option<f64>>, alias: &str) -> Result<Option<f64>> {
  row
    .get(alias)
    .copied()
    .ok_or_else(|| Error::MissingColumn(alias.to_owned()))
}
