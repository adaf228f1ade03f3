//! lq-sql - SQL dialect layer for Lazyquery
//!
//! This crate provides the dialect profiles that govern how query-builder
//! steps are spelled in each target SQL dialect, and a sqlparser-rs wrapper
//! used to validate hand-written SQL.

pub mod dialect;
pub mod error;
pub mod parser;

pub use dialect::{
    AggregateFunction, AnsiDialect, DialectKind, DuckDbDialect, LimitSyntax, SnowflakeDialect,
    SqlDialect,
};
pub use error::{SqlError, SqlResult};
pub use parser::SqlParser;
