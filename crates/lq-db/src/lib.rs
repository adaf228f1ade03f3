//! lq-db - Engine boundary for Lazyquery
//!
//! This crate provides the `Database` trait the query builder executes
//! against, the in-memory value model exchanged with the engine, and the
//! DuckDB implementation.

pub mod duckdb;
pub mod error;
pub mod traits;
pub mod value;

pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use traits::{CreateTableOptions, Database};
pub use value::{ColumnType, QueryRows, TableData, Value};
