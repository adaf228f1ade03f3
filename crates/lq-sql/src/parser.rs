//! SQL parser wrapper

use crate::dialect::{DialectKind, SqlDialect};
use crate::error::{SqlError, SqlResult};
use sqlparser::ast::{Query, Statement};

/// SQL parser that wraps sqlparser-rs with dialect support
pub struct SqlParser {
    dialect: Box<dyn SqlDialect>,
}

impl SqlParser {
    /// Create a parser for a dialect
    pub fn new(kind: DialectKind) -> Self {
        Self {
            dialect: kind.profile(),
        }
    }

    /// Create a new parser with DuckDB dialect
    pub fn duckdb() -> Self {
        Self::new(DialectKind::DuckDb)
    }

    /// Create a parser from dialect name
    pub fn from_dialect_name(name: &str) -> SqlResult<Self> {
        Ok(Self::new(name.parse()?))
    }

    /// Parse SQL into AST statements
    pub fn parse(&self, sql: &str) -> SqlResult<Vec<Statement>> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(SqlError::EmptySql);
        }

        self.dialect.parse(sql)
    }

    /// Parse SQL that must be exactly one query (SELECT, WITH, VALUES, set operation)
    pub fn parse_query(&self, sql: &str) -> SqlResult<Box<Query>> {
        let mut stmts = self.parse(sql)?;
        if stmts.len() != 1 {
            return Err(SqlError::UnsupportedStatement(format!(
                "expected a single query, found {} statements",
                stmts.len()
            )));
        }
        match stmts.remove(0) {
            Statement::Query(query) => Ok(query),
            other => Err(SqlError::UnsupportedStatement(statement_kind(&other))),
        }
    }

    /// Get the dialect name
    pub fn dialect_name(&self) -> &'static str {
        self.dialect.name()
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::duckdb()
    }
}

/// Leading keyword of a statement, for error messages
fn statement_kind(stmt: &Statement) -> String {
    stmt.to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod tests;
