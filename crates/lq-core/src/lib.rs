//! lq-core - Core library for Lazyquery
//!
//! Relations are immutable nodes describing a query as a chain of
//! transformation steps. Nothing runs against the engine until a relation is
//! materialized; until then a relation can only be inspected, extended, or
//! translated to SQL for its session's dialect.

pub mod config;
pub mod error;
pub mod executor;
pub mod expr;
pub mod oplog;
pub mod relation;
pub mod result;
pub mod session;
pub mod step;
pub mod translate;

#[cfg(test)]
mod test_utils;

pub use config::{Config, DatabaseConfig, TargetConfig};
pub use error::{LazyError, LazyResult};
pub use executor::{count_rows, materialize, peek_query_text};
pub use expr::{col, func, lit, raw, BinaryOp, Expr};
pub use oplog::OperationLog;
pub use relation::{Origin, Relation, RelationId, RowCount};
pub use result::{RealizedResult, Row};
pub use session::{Session, SessionId, SessionState};
pub use step::{Aggregation, JoinKind, JoinSpec, SortDirection, SortKey, Step};
pub use translate::translate;

pub use lq_db::{TableData, Value};
pub use lq_sql::{AggregateFunction, DialectKind};
