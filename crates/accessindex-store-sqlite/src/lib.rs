//! SQLite backend for the accessindex scoring engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. The store executes composed
//! facility queries, drives the computation engine, and persists score runs
//! atomically.

mod encode;
mod engine;
mod schema;
mod store;

pub mod error;

pub use engine::{ComputeOptions, compute_and_persist, compute_score};
pub use error::{Error, Result};
pub use store::{NodeLevel, NodeScoreRecord, ScoreRunRecord, SqliteScoreStore};

#[cfg(test)]
mod tests;
