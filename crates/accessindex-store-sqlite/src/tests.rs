//! End-to-end tests over an in-memory database: seed facility rows, compute
//! score trees, and persist runs.

use chrono::Duration;
use serde_json::json;
use uuid::Uuid;

use accessindex_core::{
  aggregate::{AggregateOptions, ScoreEntry, aggregate},
  category::{
    CategoryId, CriterionId, CriterionPivot, FacilitySelection, SubCategory,
    SubCategoryId, TopLevelCategory, TopicId, TopicPivot,
  },
  config::RegistryConfig,
  expr::Expr,
  registry::CategoryRegistry,
  rule::{ScoringRule, TagMatch},
  score::SubCategoryScore,
};

use crate::{
  ComputeOptions, NodeLevel, SqliteScoreStore,
  engine::{compute_and_persist, compute_score},
};

const RESTAURANTS: &str = r#"
  min_data_quality_factor = 0.1

  [rules.entrance]
  kind = "graded_tag"
  key = "wheelchair"
  promoted = true
  grades = [
    { value = "yes", points = 100 },
    { value = "limited", points = 50 },
    { value = "no", points = 0 },
  ]

  [rules.toilet]
  kind = "presence_share"
  tags = [{ key = "toilets:wheelchair", value = "yes" }]

  [[category]]
  id = "food_and_drinks"
  weight = 1.0

  [[category.sub_category]]
  id = "restaurants"
  weight = 1.0
  categories = ["restaurant", "cafe"]

  [[category.sub_category.topic]]
  id = "mobility"

  [[category.sub_category.topic.criterion]]
  id = "entrance"
  weight = 0.7

  [[category.sub_category.topic.criterion]]
  id = "toilet"
  weight = 0.3
"#;

fn restaurants_registry() -> CategoryRegistry {
  toml::from_str::<RegistryConfig>(RESTAURANTS)
    .unwrap()
    .build()
    .unwrap()
}

async fn seed(
  store: &SqliteScoreStore,
  area: Uuid,
  category: &str,
  wheelchair: Option<&str>,
  tags: serde_json::Value,
) {
  store
    .add_facility(area, category, &tags, wheelchair)
    .await
    .unwrap();
}

/// Three matching rows for `area`: wheelchair yes (with an accessible
/// toilet), limited, and untagged. Plus noise the filter must ignore.
async fn seed_restaurants(store: &SqliteScoreStore, area: Uuid) {
  seed(store, area, "restaurant", Some("yes"), json!({ "toilets:wheelchair": "yes" })).await;
  seed(store, area, "cafe", Some("limited"), json!({})).await;
  seed(store, area, "restaurant", None, json!({})).await;

  // Wrong category, and a fully-tagged row in another admin area.
  seed(store, area, "pharmacy", Some("yes"), json!({})).await;
  seed(store, Uuid::new_v4(), "restaurant", Some("no"), json!({})).await;
}

#[tokio::test]
async fn computes_scores_end_to_end() {
  let store = SqliteScoreStore::open_in_memory().await.unwrap();
  let registry = restaurants_registry();
  let area = Uuid::new_v4();
  seed_restaurants(&store, area).await;

  let tree = compute_score(&store, &registry, area, &ComputeOptions::default())
    .await
    .unwrap();

  // Entrance: avg(100, 50) over the two graded rows = 75; 2 of 3 rows
  // graded, so quality 2/3 * 0.9 + 0.1 = 0.7. Toilet: 1 of 3 rows
  // matches, ceil(100/3) = 34, quality 1/3 * 0.9 + 0.1 = 0.4.
  let topic = &tree.categories[0].sub_categories[0].topics[0];
  assert_eq!(topic.criteria[0].score, Some(75));
  assert_eq!(topic.criteria[0].data_quality, 0.7);
  assert_eq!(topic.criteria[1].score, Some(34));
  assert_eq!(topic.criteria[1].data_quality, 0.4);

  // Topic: ceil(0.7 * 75 + 0.3 * 34) = 63; quality 0.7*0.7 + 0.3*0.4.
  assert_eq!(topic.score, Some(63));
  assert_eq!(topic.data_quality, 0.61);

  let sub = &tree.categories[0].sub_categories[0];
  assert_eq!(sub.score, Some(63));
  assert_eq!(sub.data_quality, Some(0.61));
  assert_eq!(sub.rows_matched, 3);

  assert_eq!(tree.categories[0].score, Some(63));
  assert_eq!(tree.score, Some(63));
  assert_eq!(tree.data_quality, 0.61);
  assert_eq!(tree.unadjusted_score, None);
}

#[tokio::test]
async fn sub_category_without_rows_renormalizes_its_siblings() {
  let config = r#"
    [rules.entrance]
    kind = "presence_share"
    tags = [{ key = "wheelchair", promoted = true }]

    [[category]]
    id = "food_and_drinks"
    weight = 1.0

    [[category.sub_category]]
    id = "restaurants"
    weight = 0.5
    categories = ["restaurant"]

    [[category.sub_category.topic]]
    id = "mobility"

    [[category.sub_category.topic.criterion]]
    id = "entrance"
    weight = 1.0

    [[category.sub_category]]
    id = "cafes"
    weight = 0.5
    categories = ["cafe"]

    [[category.sub_category.topic]]
    id = "mobility"

    [[category.sub_category.topic.criterion]]
    id = "entrance"
    weight = 1.0
  "#;
  let registry = toml::from_str::<RegistryConfig>(config)
    .unwrap()
    .build()
    .unwrap();

  let store = SqliteScoreStore::open_in_memory().await.unwrap();
  let area = Uuid::new_v4();
  seed(&store, area, "restaurant", Some("yes"), json!({})).await;
  seed(&store, area, "restaurant", None, json!({})).await;

  let tree = compute_score(&store, &registry, area, &ComputeOptions::default())
    .await
    .unwrap();

  fn by_id<'a>(subs: &'a [SubCategoryScore], id: &str) -> &'a SubCategoryScore {
    subs.iter().find(|s| s.id.as_str() == id).unwrap()
  }

  let subs = &tree.categories[0].sub_categories;
  let cafes = by_id(subs, "cafes");
  assert_eq!(cafes.rows_matched, 0);
  assert_eq!(cafes.score, None);
  assert_eq!(cafes.data_quality, None);

  // The cafes branch drops out of the weighted sum entirely; its floored
  // quality still averages into the parent factor.
  assert_eq!(by_id(subs, "restaurants").score, Some(50));
  assert_eq!(tree.categories[0].score, Some(50));
  assert_eq!(tree.score, Some(50));
  assert_eq!(tree.categories[0].data_quality, 0.325);
}

#[tokio::test]
async fn extra_filter_restricts_the_facility_rows() {
  let mut selection =
    FacilitySelection::for_categories("facilities", vec!["restaurant".into()]);
  selection.extra_filter = Some(Expr::tag("capacity").gt(Expr::integer(10)));

  let registry = CategoryRegistry::builder()
    .rule(
      CriterionId("entrance".into()),
      ScoringRule::PresenceShare {
        tags: vec![TagMatch { key: "wheelchair".into(), value: None, promoted: true }],
      },
    )
    .category(TopLevelCategory {
      id:             CategoryId("food_and_drinks".into()),
      weight:         1.0,
      sdg_tags:       vec![],
      planned:        false,
      sub_categories: vec![SubCategory {
        id: SubCategoryId("large_restaurants".into()),
        weight: 1.0,
        selection,
        topics: vec![TopicPivot {
          id:       TopicId("mobility".into()),
          criteria: vec![CriterionPivot {
            id:            CriterionId("entrance".into()),
            weight:        1.0,
            rule_override: None,
          }],
        }],
      }],
    })
    .build()
    .unwrap();

  let store = SqliteScoreStore::open_in_memory().await.unwrap();
  let area = Uuid::new_v4();
  seed(&store, area, "restaurant", Some("yes"), json!({ "capacity": 50 })).await;
  seed(&store, area, "restaurant", None, json!({ "capacity": 5 })).await;
  seed(&store, area, "restaurant", None, json!({})).await;

  let tree = compute_score(&store, &registry, area, &ComputeOptions::default())
    .await
    .unwrap();

  // Only the capacity-50 row passes the extra predicate; rows without the
  // tag fall out with it.
  let sub = &tree.categories[0].sub_categories[0];
  assert_eq!(sub.rows_matched, 1);
  assert_eq!(sub.score, Some(100));
  assert_eq!(sub.data_quality, Some(1.0));
}

#[tokio::test]
async fn recomputation_over_unchanged_data_is_deterministic() {
  let store = SqliteScoreStore::open_in_memory().await.unwrap();
  let registry = restaurants_registry();
  let area = Uuid::new_v4();
  seed_restaurants(&store, area).await;

  let options = ComputeOptions::default();
  let first = compute_score(&store, &registry, area, &options).await.unwrap();
  let second = compute_score(&store, &registry, area, &options).await.unwrap();
  assert!(first.same_scores(&second));
}

#[tokio::test]
async fn sql_combination_matches_the_in_process_aggregator() {
  let store = SqliteScoreStore::open_in_memory().await.unwrap();
  let registry = restaurants_registry();
  let area = Uuid::new_v4();
  seed_restaurants(&store, area).await;

  let tree = compute_score(&store, &registry, area, &ComputeOptions::default())
    .await
    .unwrap();
  let topic = &tree.categories[0].sub_categories[0].topics[0];

  let entries: Vec<ScoreEntry> = topic
    .criteria
    .iter()
    .zip([0.7, 0.3])
    .map(|(c, weight)| {
      ScoreEntry::scored(c.score.unwrap() as f64)
        .with_quality(c.data_quality)
        .with_weight(weight)
    })
    .collect();
  let combined = aggregate(&entries, &AggregateOptions::default());

  assert_eq!(topic.score, combined.score);
  assert_eq!(topic.data_quality, combined.data_quality);
}

#[tokio::test]
async fn persists_a_run_and_reads_it_back() {
  let store = SqliteScoreStore::open_in_memory().await.unwrap();
  let registry = restaurants_registry();
  let area = Uuid::new_v4();
  seed_restaurants(&store, area).await;

  let (tree, run_id) =
    compute_and_persist(&store, &registry, area, &ComputeOptions::default())
      .await
      .unwrap();

  let run = store.latest_run(area).await.unwrap().unwrap();
  assert_eq!(run.run_id, run_id);
  assert_eq!(run.admin_area_id, area);
  assert_eq!(run.score, tree.score);
  assert_eq!(run.unadjusted_score, None);
  assert_eq!(run.data_quality, tree.data_quality);

  // 1 category + 1 sub-category + 1 topic + 2 criteria.
  let nodes = store.fetch_run_nodes(run_id).await.unwrap();
  assert_eq!(nodes.len(), 5);

  let category = nodes
    .iter()
    .find(|n| n.level == NodeLevel::TopLevelCategory)
    .unwrap();
  assert_eq!(category.parent_id, None);
  assert_eq!(category.node_id, "food_and_drinks");
  assert_eq!(category.score, Some(63));

  let topic = nodes.iter().find(|n| n.level == NodeLevel::Topic).unwrap();
  let criteria: Vec<_> = nodes
    .iter()
    .filter(|n| n.level == NodeLevel::Criterion)
    .collect();
  assert_eq!(criteria.len(), 2);
  assert!(criteria.iter().all(|c| c.parent_id == Some(topic.node_score_id)));
}

#[tokio::test]
async fn failed_persist_rolls_back_the_entire_run() {
  let store = SqliteScoreStore::open_in_memory().await.unwrap();
  let registry = restaurants_registry();
  let area = Uuid::new_v4();
  seed_restaurants(&store, area).await;

  let options = ComputeOptions::default();
  let (first, first_id) = compute_and_persist(&store, &registry, area, &options)
    .await
    .unwrap();

  // Fail the criterion-level inserts, after the run row and the upper tree
  // nodes have already been written inside the transaction.
  store
    .execute_batch(
      "CREATE TRIGGER node_scores_reject_criteria
       BEFORE INSERT ON node_scores
       WHEN NEW.level = 'criterion'
       BEGIN SELECT RAISE(ABORT, 'criterion writes disabled'); END",
    )
    .await
    .unwrap();

  let mut second = compute_score(&store, &registry, area, &options).await.unwrap();
  second.computed_at = first.computed_at + Duration::hours(1);
  assert!(store.persist_run(&second).await.is_err());

  // Nothing of the failed run is visible: the prior run is still the
  // latest, and neither table grew.
  let latest = store.latest_run(area).await.unwrap().unwrap();
  assert_eq!(latest.run_id, first_id);
  assert_eq!(latest.computed_at, first.computed_at);
  assert_eq!(store.count_rows("score_runs").await.unwrap(), 1);
  assert_eq!(store.count_rows("node_scores").await.unwrap(), 5);
}

#[tokio::test]
async fn latest_run_follows_computed_at_not_insertion_order() {
  let store = SqliteScoreStore::open_in_memory().await.unwrap();
  let registry = restaurants_registry();
  let area = Uuid::new_v4();
  seed_restaurants(&store, area).await;

  let options = ComputeOptions::default();
  let later = compute_score(&store, &registry, area, &options).await.unwrap();
  let mut earlier = later.clone();
  earlier.computed_at = later.computed_at - Duration::hours(1);

  // Insert the newer run first; ordering must come from the timestamp.
  let later_id = store.persist_run(&later).await.unwrap();
  store.persist_run(&earlier).await.unwrap();

  let latest = store.latest_run(area).await.unwrap().unwrap();
  assert_eq!(latest.run_id, later_id);
  assert_eq!(latest.computed_at, later.computed_at);
}

#[tokio::test]
async fn adjusted_runs_persist_the_unadjusted_score() {
  let store = SqliteScoreStore::open_in_memory().await.unwrap();
  let registry = restaurants_registry();
  let area = Uuid::new_v4();
  seed_restaurants(&store, area).await;

  let options = ComputeOptions { adjust_weights_by_data_quality: true };
  let (tree, run_id) = compute_and_persist(&store, &registry, area, &options)
    .await
    .unwrap();

  assert!(tree.unadjusted_score.is_some());
  let run = store.latest_run(area).await.unwrap().unwrap();
  assert_eq!(run.run_id, run_id);
  assert_eq!(run.unadjusted_score, tree.unadjusted_score);
}

#[tokio::test]
async fn lists_every_admin_area_with_facilities() {
  let store = SqliteScoreStore::open_in_memory().await.unwrap();
  let a = Uuid::new_v4();
  let b = Uuid::new_v4();
  seed(&store, a, "restaurant", Some("yes"), json!({})).await;
  seed(&store, a, "cafe", None, json!({})).await;
  seed(&store, b, "restaurant", None, json!({})).await;

  let mut areas = store.list_admin_areas().await.unwrap();
  areas.sort();
  let mut expected = vec![a, b];
  expected.sort();
  assert_eq!(areas, expected);
}

#[tokio::test]
async fn missing_area_has_no_latest_run() {
  let store = SqliteScoreStore::open_in_memory().await.unwrap();
  assert!(store.latest_run(Uuid::new_v4()).await.unwrap().is_none());
}
