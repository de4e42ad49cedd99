//! Query composer.
//!
//! For one sub-category and one geographic filter this builds a single
//! query whose one result row carries every criterion score and data-quality
//! value, every topic score, the sub-category score, and the matched row
//! count. The query nests four levels of sub-selects:
//!
//! 1. the facility rows (selection filter, caller joins, geographic filter —
//!    the only level the filter touches),
//! 2. the criterion aggregates,
//! 3. the topic combinations, referencing only level 2's output columns,
//! 4. the sub-category combination, referencing only level 3's.
//!
//! Topic and sub-category combinations renormalize by the weight of the
//! non-null inputs, so one criterion without data never nulls its topic;
//! the combined column is NULL only when every input is. This matches what
//! [`crate::aggregate`] computes in-process for the default policy.

use crate::{
  category::{CriterionId, SubCategory, SubCategoryId, TopicId},
  expr::{Expr, Join, Select, SelectColumn, Source, Value},
  registry::CategoryRegistry,
  alias,
};

// ─── Filter ──────────────────────────────────────────────────────────────────

/// An opaque geographic predicate over the innermost facility rows,
/// supplied by the facility-data collaborator.
#[derive(Debug, Clone)]
pub struct GeoFilter {
  pub predicate: Expr,
  /// Extra joins the predicate needs (e.g. an admin-area geometry table).
  pub joins:     Vec<Join>,
}

impl GeoFilter {
  /// Filter facilities by their promoted admin-area column.
  pub fn admin_area(id: impl Into<String>) -> Self {
    Self {
      predicate: Expr::column("admin_area_id").eq(Expr::text(id)),
      joins:     Vec::new(),
    }
  }
}

// ─── Composed query ──────────────────────────────────────────────────────────

/// A composed sub-category query plus the aliases needed to read its single
/// result row back.
#[derive(Debug, Clone)]
pub struct SubCategoryQuery {
  pub sub_category: SubCategoryId,
  pub select:       Select,
  pub score_alias:  String,
  pub rows_alias:   String,
  pub topics:       Vec<TopicAliases>,
}

#[derive(Debug, Clone)]
pub struct TopicAliases {
  pub topic:       TopicId,
  pub score_alias: String,
  pub criteria:    Vec<CriterionAliases>,
}

#[derive(Debug, Clone)]
pub struct CriterionAliases {
  pub criterion:     CriterionId,
  pub weight:        f64,
  pub score_alias:   String,
  pub quality_alias: String,
}

// ─── Composition ─────────────────────────────────────────────────────────────

/// Build the four-level query for `sub` under `filter`.
pub fn compose_sub_category(
  registry: &CategoryRegistry,
  sub: &SubCategory,
  filter: &GeoFilter,
) -> SubCategoryQuery {
  let min_dqf = registry.min_data_quality_factor();

  // Level 1: facility rows. The geographic filter is injected here and
  // nowhere else.
  let mut conditions = Vec::new();
  if !sub.selection.categories.is_empty() {
    conditions.push(Expr::In {
      expr:   Box::new(Expr::column("category")),
      values: sub
        .selection
        .categories
        .iter()
        .map(|c| Value::Text(c.clone()))
        .collect(),
    });
  }
  if let Some(extra) = &sub.selection.extra_filter {
    conditions.push(extra.clone());
  }
  conditions.push(filter.predicate.clone());

  let mut joins = sub.selection.joins.clone();
  joins.extend(filter.joins.iter().cloned());

  let facility_rows = Select {
    columns:  vec![SelectColumn::Star],
    from:     Source::Table { name: sub.selection.table.clone() },
    joins,
    filter:   Some(Expr::And(conditions)),
    group_by: sub.selection.group_by.clone(),
  };

  // Level 2: criterion aggregates plus the matched row count.
  let rows_alias = alias::sub_category_rows(&sub.id);
  let mut criterion_columns =
    vec![SelectColumn::aliased(Expr::CountAll, rows_alias.clone())];
  let mut topics = Vec::with_capacity(sub.topics.len());

  for topic in &sub.topics {
    let mut criteria = Vec::with_capacity(topic.criteria.len());
    for pivot in &topic.criteria {
      let rule = registry.rule_for(pivot);
      let score_alias = alias::criterion_score(&sub.id, &topic.id, &pivot.id);
      let quality_alias = alias::criterion_quality(&sub.id, &topic.id, &pivot.id);

      criterion_columns.push(SelectColumn::aliased(
        rule.score_expr().ceil(),
        score_alias.clone(),
      ));
      criterion_columns.push(SelectColumn::aliased(
        rule.quality_expr(min_dqf),
        quality_alias.clone(),
      ));

      criteria.push(CriterionAliases {
        criterion: pivot.id.clone(),
        weight: pivot.weight,
        score_alias,
        quality_alias,
      });
    }
    topics.push(TopicAliases {
      topic:       topic.id.clone(),
      score_alias: alias::topic_score(&sub.id, &topic.id),
      criteria,
    });
  }

  let criterion_scores = Select {
    columns:  criterion_columns,
    from:     Source::Subquery {
      select: Box::new(facility_rows),
      alias:  "facility_rows".into(),
    },
    joins:    vec![],
    filter:   None,
    group_by: vec![],
  };

  // Level 3: topic scores from the criterion columns and configured
  // weights (weights come from the registry, not from the database).
  let mut topic_columns = vec![SelectColumn::Star];
  for topic in &topics {
    let terms: Vec<(f64, Expr)> = topic
      .criteria
      .iter()
      .map(|c| (c.weight, Expr::column(&c.score_alias)))
      .collect();
    topic_columns.push(SelectColumn::aliased(
      weighted_average(&terms).ceil(),
      topic.score_alias.clone(),
    ));
  }

  let topic_scores = Select {
    columns:  topic_columns,
    from:     Source::Subquery {
      select: Box::new(criterion_scores),
      alias:  "criterion_scores".into(),
    },
    joins:    vec![],
    filter:   None,
    group_by: vec![],
  };

  // Level 4: the sub-category score — unweighted average of its topics.
  let score_alias = alias::sub_category_score(&sub.id);
  let terms: Vec<(f64, Expr)> = topics
    .iter()
    .map(|t| (1.0, Expr::column(&t.score_alias)))
    .collect();
  let select = Select {
    columns:  vec![
      SelectColumn::Star,
      SelectColumn::aliased(weighted_average(&terms).ceil(), score_alias.clone()),
    ],
    from:     Source::Subquery {
      select: Box::new(topic_scores),
      alias:  "topic_scores".into(),
    },
    joins:    vec![],
    filter:   None,
    group_by: vec![],
  };

  SubCategoryQuery {
    sub_category: sub.id.clone(),
    select,
    score_alias,
    rows_alias,
    topics,
  }
}

/// `sum(w_i * x_i present) / sum(w_i of present x_i)` — a NULL input drops
/// out of numerator and denominator alike. An all-NULL input divides by
/// zero, which the database reports as NULL.
fn weighted_average(terms: &[(f64, Expr)]) -> Expr {
  let numerator = terms
    .iter()
    .map(|(weight, expr)| {
      Expr::Coalesce(vec![expr.clone().mul(Expr::real(*weight)), Expr::real(0.0)])
    })
    .reduce(Expr::add)
    .unwrap_or(Expr::real(0.0));

  let denominator = terms
    .iter()
    .map(|(weight, expr)| Expr::Case {
      whens:     vec![(expr.clone().is_not_null(), Expr::real(*weight))],
      otherwise: Some(Box::new(Expr::real(0.0))),
    })
    .reduce(Expr::add)
    .unwrap_or(Expr::real(0.0));

  numerator.div(denominator)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
