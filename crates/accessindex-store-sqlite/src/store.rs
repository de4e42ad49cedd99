//! [`SqliteScoreStore`] — query execution and score-run persistence.

use std::{collections::HashMap, path::Path};

use rusqlite::{
  OptionalExtension as _,
  types::{ToSqlOutput, Value as SqlValue, ValueRef},
};
use uuid::Uuid;

use accessindex_core::{
  expr::{Sql, Value},
  score::ScoreTree,
};

use crate::{
  Result,
  encode::{decode_dt, decode_node_level, decode_uuid, encode_dt, encode_node_level, encode_uuid},
  schema::SCHEMA,
};

// ─── Records ─────────────────────────────────────────────────────────────────

/// Which level of the category tree a [`NodeScoreRecord`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeLevel {
  TopLevelCategory,
  SubCategory,
  Topic,
  Criterion,
}

/// One persisted score run; immutable once committed.
#[derive(Debug, Clone)]
pub struct ScoreRunRecord {
  pub run_id:           Uuid,
  pub admin_area_id:    Uuid,
  pub computed_at:      chrono::DateTime<chrono::Utc>,
  pub score:            Option<i64>,
  pub unadjusted_score: Option<i64>,
  pub data_quality:     f64,
}

/// One persisted tree node of a run, referencing its immediate parent.
#[derive(Debug, Clone)]
pub struct NodeScoreRecord {
  pub node_score_id:    Uuid,
  pub run_id:           Uuid,
  pub parent_id:        Option<Uuid>,
  pub level:            NodeLevel,
  pub node_id:          String,
  pub score:            Option<i64>,
  pub unadjusted_score: Option<i64>,
  pub data_quality:     Option<f64>,
}

// ─── Parameter bridging ──────────────────────────────────────────────────────

/// Adapter so core [`Value`] parameters bind through rusqlite.
struct SqlParam<'a>(&'a Value);

impl rusqlite::ToSql for SqlParam<'_> {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(match self.0 {
      Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
      Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
      Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
    })
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An accessindex store backed by a single SQLite file holding both the
/// facility data and the persisted score runs.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteScoreStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteScoreStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Composed-query execution ──────────────────────────────────────────────

  /// Execute a rendered composed query and return its single result row as
  /// alias → numeric value. Aggregate queries always produce exactly one
  /// row.
  pub async fn query_composed(&self, sql: Sql) -> Result<HashMap<String, Option<f64>>> {
    let Sql { text, params } = sql;
    let row = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&text)?;
        let names: Vec<String> =
          stmt.column_names().into_iter().map(str::to_owned).collect();
        let row = stmt.query_row(
          rusqlite::params_from_iter(params.iter().map(SqlParam)),
          |row| {
            let mut values = HashMap::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
              let value: Option<f64> = row.get(i)?;
              values.insert(name.clone(), value);
            }
            Ok(values)
          },
        )?;
        Ok(row)
      })
      .await?;
    Ok(row)
  }

  // ── Facilities ────────────────────────────────────────────────────────────

  /// Insert one facility row. The real ingestion pipeline lives elsewhere;
  /// this is the seam it writes through, and what tests seed with.
  pub async fn add_facility(
    &self,
    admin_area_id: Uuid,
    category: &str,
    tags: &serde_json::Value,
    wheelchair: Option<&str>,
  ) -> Result<Uuid> {
    let facility_id = Uuid::new_v4();
    let id_str = encode_uuid(facility_id);
    let area_str = encode_uuid(admin_area_id);
    let category = category.to_owned();
    let tags_str = tags.to_string();
    let wheelchair = wheelchair.map(str::to_owned);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO facilities (facility_id, admin_area_id, category, tags, wheelchair)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, area_str, category, tags_str, wheelchair],
        )?;
        Ok(())
      })
      .await?;

    Ok(facility_id)
  }

  /// Every admin area with at least one facility row.
  pub async fn list_admin_areas(&self) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT admin_area_id FROM facilities ORDER BY admin_area_id",
        )?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  // ── Score-run persistence ─────────────────────────────────────────────────

  /// Persist one fully computed score tree: one `score_runs` row plus one
  /// `node_scores` row per tree node, inside a single transaction. If any
  /// write fails the whole run is rolled back — no partial tree is ever
  /// visible to readers.
  pub async fn persist_run(&self, tree: &ScoreTree) -> Result<Uuid> {
    let run_id = Uuid::new_v4();
    let run_id_str = encode_uuid(run_id);
    let area_str = encode_uuid(tree.admin_area_id);
    let computed_at_str = encode_dt(tree.computed_at);
    let score = tree.score;
    let unadjusted = tree.unadjusted_score;
    let data_quality = tree.data_quality;
    let nodes = flatten(tree, run_id);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO score_runs (
             run_id, admin_area_id, computed_at, score, unadjusted_score, data_quality
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![run_id_str, area_str, computed_at_str, score, unadjusted, data_quality],
        )?;

        for node in &nodes {
          tx.execute(
            "INSERT INTO node_scores (
               node_score_id, run_id, parent_id, level, node_id,
               score, unadjusted_score, data_quality
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
              encode_uuid(node.node_score_id),
              encode_uuid(node.run_id),
              node.parent_id.map(encode_uuid),
              encode_node_level(node.level),
              node.node_id,
              node.score,
              node.unadjusted_score,
              node.data_quality,
            ],
          )?;
        }

        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::info!(
      admin_area = %tree.admin_area_id,
      run = %run_id,
      score = ?tree.score,
      "persisted score run"
    );
    Ok(run_id)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// The most recent fully-committed run for an admin area.
  pub async fn latest_run(&self, admin_area_id: Uuid) -> Result<Option<ScoreRunRecord>> {
    let area_str = encode_uuid(admin_area_id);

    let raw: Option<RawRun> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT run_id, admin_area_id, computed_at, score, unadjusted_score, data_quality
               FROM score_runs
               WHERE admin_area_id = ?1
               ORDER BY computed_at DESC
               LIMIT 1",
              rusqlite::params![area_str],
              |row| {
                Ok(RawRun {
                  run_id:           row.get(0)?,
                  admin_area_id:    row.get(1)?,
                  computed_at:      row.get(2)?,
                  score:            row.get(3)?,
                  unadjusted_score: row.get(4)?,
                  data_quality:     row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRun::into_record).transpose()
  }

  /// All node records of one run, parents before children.
  pub async fn fetch_run_nodes(&self, run_id: Uuid) -> Result<Vec<NodeScoreRecord>> {
    let run_str = encode_uuid(run_id);

    let raws: Vec<RawNode> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT node_score_id, run_id, parent_id, level, node_id,
                  score, unadjusted_score, data_quality
           FROM node_scores
           WHERE run_id = ?1
           ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![run_str], |row| {
            Ok(RawNode {
              node_score_id:    row.get(0)?,
              run_id:           row.get(1)?,
              parent_id:        row.get(2)?,
              level:            row.get(3)?,
              node_id:          row.get(4)?,
              score:            row.get(5)?,
              unadjusted_score: row.get(6)?,
              data_quality:     row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawNode::into_record).collect()
  }

  // ── Test support ──────────────────────────────────────────────────────────

  #[cfg(test)]
  pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  #[cfg(test)]
  pub(crate) async fn count_rows(&self, table: &'static str) -> Result<i64> {
    let count = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |row| row.get(0))?)
      })
      .await?;
    Ok(count)
  }
}

// ─── Tree flattening ─────────────────────────────────────────────────────────

struct NodeRow {
  node_score_id:    Uuid,
  run_id:           Uuid,
  parent_id:        Option<Uuid>,
  level:            NodeLevel,
  node_id:          String,
  score:            Option<i64>,
  unadjusted_score: Option<i64>,
  data_quality:     Option<f64>,
}

/// One row per tree node, each referencing its immediate parent's
/// generated id.
fn flatten(tree: &ScoreTree, run_id: Uuid) -> Vec<NodeRow> {
  let mut rows = Vec::new();

  for category in &tree.categories {
    let category_row_id = Uuid::new_v4();
    rows.push(NodeRow {
      node_score_id: category_row_id,
      run_id,
      parent_id: None,
      level: NodeLevel::TopLevelCategory,
      node_id: category.id.to_string(),
      score: category.score,
      unadjusted_score: category.unadjusted_score,
      data_quality: Some(category.data_quality),
    });

    for sub in &category.sub_categories {
      let sub_row_id = Uuid::new_v4();
      rows.push(NodeRow {
        node_score_id: sub_row_id,
        run_id,
        parent_id: Some(category_row_id),
        level: NodeLevel::SubCategory,
        node_id: sub.id.to_string(),
        score: sub.score,
        unadjusted_score: None,
        data_quality: sub.data_quality,
      });

      for topic in &sub.topics {
        let topic_row_id = Uuid::new_v4();
        rows.push(NodeRow {
          node_score_id: topic_row_id,
          run_id,
          parent_id: Some(sub_row_id),
          level: NodeLevel::Topic,
          node_id: topic.id.to_string(),
          score: topic.score,
          unadjusted_score: None,
          data_quality: Some(topic.data_quality),
        });

        for criterion in &topic.criteria {
          rows.push(NodeRow {
            node_score_id: Uuid::new_v4(),
            run_id,
            parent_id: Some(topic_row_id),
            level: NodeLevel::Criterion,
            node_id: criterion.id.to_string(),
            score: criterion.score,
            unadjusted_score: None,
            data_quality: Some(criterion.data_quality),
          });
        }
      }
    }
  }

  rows
}

// ─── Raw row types ───────────────────────────────────────────────────────────

struct RawRun {
  run_id:           String,
  admin_area_id:    String,
  computed_at:      String,
  score:            Option<i64>,
  unadjusted_score: Option<i64>,
  data_quality:     f64,
}

impl RawRun {
  fn into_record(self) -> Result<ScoreRunRecord> {
    Ok(ScoreRunRecord {
      run_id:           decode_uuid(&self.run_id)?,
      admin_area_id:    decode_uuid(&self.admin_area_id)?,
      computed_at:      decode_dt(&self.computed_at)?,
      score:            self.score,
      unadjusted_score: self.unadjusted_score,
      data_quality:     self.data_quality,
    })
  }
}

struct RawNode {
  node_score_id:    String,
  run_id:           String,
  parent_id:        Option<String>,
  level:            String,
  node_id:          String,
  score:            Option<i64>,
  unadjusted_score: Option<i64>,
  data_quality:     Option<f64>,
}

impl RawNode {
  fn into_record(self) -> Result<NodeScoreRecord> {
    Ok(NodeScoreRecord {
      node_score_id:    decode_uuid(&self.node_score_id)?,
      run_id:           decode_uuid(&self.run_id)?,
      parent_id:        self.parent_id.as_deref().map(decode_uuid).transpose()?,
      level:            decode_node_level(&self.level)?,
      node_id:          self.node_id,
      score:            self.score,
      unadjusted_score: self.unadjusted_score,
      data_quality:     self.data_quality,
    })
  }
}
