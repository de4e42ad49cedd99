//! SQL schema for the accessindex SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Facility rows are written by the external sync pipeline; the scoring
-- engine only reads them. Common tag keys are promoted into indexed
-- columns; everything else lives in the raw JSON tag map.
CREATE TABLE IF NOT EXISTS facilities (
    facility_id   TEXT PRIMARY KEY,
    admin_area_id TEXT NOT NULL,
    category      TEXT NOT NULL,             -- facility type, e.g. 'restaurant'
    tags          TEXT NOT NULL DEFAULT '{}', -- raw tag map, JSON object
    wheelchair    TEXT,                      -- promoted copy of tags.wheelchair
    name          TEXT
);

-- Score runs are strictly append-only: one row per (admin area, run),
-- immutable once the transaction commits. 'Latest' is determined by
-- computed_at ordering, never by update.
CREATE TABLE IF NOT EXISTS score_runs (
    run_id           TEXT PRIMARY KEY,
    admin_area_id    TEXT NOT NULL,
    computed_at      TEXT NOT NULL,          -- ISO 8601 UTC
    score            INTEGER,                -- NULL when no branch had data
    unadjusted_score INTEGER,
    data_quality     REAL NOT NULL
);

-- One row per tree node per run, referencing its immediate parent's
-- generated id. Written in the same transaction as the run row.
CREATE TABLE IF NOT EXISTS node_scores (
    node_score_id    TEXT PRIMARY KEY,
    run_id           TEXT NOT NULL REFERENCES score_runs(run_id),
    parent_id        TEXT REFERENCES node_scores(node_score_id),
    level            TEXT NOT NULL,          -- 'top_level_category' | 'sub_category' | 'topic' | 'criterion'
    node_id          TEXT NOT NULL,          -- tree node id, e.g. 'restaurants'
    score            INTEGER,
    unadjusted_score INTEGER,
    data_quality     REAL
);

CREATE INDEX IF NOT EXISTS facilities_area_idx  ON facilities(admin_area_id, category);
CREATE INDEX IF NOT EXISTS score_runs_area_idx  ON score_runs(admin_area_id, computed_at);
CREATE INDEX IF NOT EXISTS node_scores_run_idx  ON node_scores(run_id);

PRAGMA user_version = 1;
";
