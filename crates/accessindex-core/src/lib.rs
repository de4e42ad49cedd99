//! Core types and algorithms for the accessindex scoring engine.
//!
//! This crate is deliberately free of database and I/O dependencies. The
//! query composer produces a typed AST, the aggregator is a pure function of
//! numeric inputs, and the registry is an immutable tree built once at
//! startup — all of it testable without a live database.

pub mod aggregate;
pub mod alias;
pub mod category;
pub mod compose;
pub mod config;
pub mod error;
pub mod expr;
pub mod registry;
pub mod rollup;
pub mod rule;
pub mod score;

pub use error::{Error, Result};
