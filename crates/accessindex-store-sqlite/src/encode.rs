//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, UUIDs as hyphenated lowercase
//! strings, node levels as snake_case discriminants.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result, store::NodeLevel};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NodeLevel ───────────────────────────────────────────────────────────────

pub fn encode_node_level(level: NodeLevel) -> &'static str {
  match level {
    NodeLevel::TopLevelCategory => "top_level_category",
    NodeLevel::SubCategory => "sub_category",
    NodeLevel::Topic => "topic",
    NodeLevel::Criterion => "criterion",
  }
}

pub fn decode_node_level(s: &str) -> Result<NodeLevel> {
  match s {
    "top_level_category" => Ok(NodeLevel::TopLevelCategory),
    "sub_category" => Ok(NodeLevel::SubCategory),
    "topic" => Ok(NodeLevel::Topic),
    "criterion" => Ok(NodeLevel::Criterion),
    other => Err(Error::UnknownNodeLevel(other.to_owned())),
  }
}
