//! Error types for lq-core

use crate::relation::RelationId;
use crate::session::SessionId;
use lq_db::DbError;
use lq_sql::SqlError;
use thiserror::Error;

/// Core error type for Lazyquery
#[derive(Error, Debug)]
pub enum LazyError {
    /// L001: A step references a column the input provably lacks
    #[error("[L001] Schema error in {operation} on relation {relation}: column '{column}' not found (available: {available})")]
    Schema {
        relation: RelationId,
        operation: &'static str,
        column: String,
        available: String,
    },

    /// L002: A step has no translation for the dialect
    #[error("[L002] Cannot translate {operation} in relation {relation} for dialect {dialect}: {reason}")]
    Translation {
        relation: RelationId,
        operation: String,
        dialect: &'static str,
        reason: String,
    },

    /// L003: Join across sessions without the copy flag
    #[error("[L003] Relation {relation} joins relation {other} from session {other_session}, which is not session {session}; enable copy on the join to pull it in locally")]
    CrossSession {
        relation: RelationId,
        other: RelationId,
        session: SessionId,
        other_session: SessionId,
    },

    /// L004: The engine rejected or failed to run a query
    #[error("[L004] Execution failed for {}: {source}\nSQL: {sql}", describe_target(.relation))]
    Execution {
        relation: Option<RelationId>,
        sql: String,
        #[source]
        source: DbError,
    },

    /// L005: Session has been closed
    #[error("[L005] Session {session} is closed")]
    SessionClosed { session: SessionId },

    /// L006: Table does not exist in the engine
    #[error("[L006] Table '{table}' not found in session {session}")]
    UnknownTable { table: String, session: SessionId },

    /// L007: `close` called on an already closed session
    #[error("[L007] Session {session} is already closed")]
    AlreadyClosed { session: SessionId },

    /// L008: Session created but never connected
    #[error("[L008] Session {session} is not connected; call connect() first")]
    SessionNotOpen { session: SessionId },

    /// L009: Hand-written SQL failed validation
    #[error("[L009] Invalid query: {0}")]
    InvalidQuery(#[from] SqlError),

    /// L010: Engine failure outside of a query (connect, load, index)
    #[error("[L010] Database error: {0}")]
    Database(#[from] DbError),

    /// L011: Configuration file not found
    #[error("[L011] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// L012: Invalid configuration value
    #[error("[L012] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// L013: IO error with file path context
    #[error("[L013] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// L014: YAML parse error
    #[error("[L014] Config parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

fn describe_target(relation: &Option<RelationId>) -> String {
    match relation {
        Some(id) => format!("relation {}", id),
        None => "raw query".to_string(),
    }
}

/// Result type alias for LazyError
pub type LazyResult<T> = Result<T, LazyError>;
