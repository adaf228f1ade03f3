//! SQL dialect profiles
//!
//! A profile decides how a translated query is spelled for one target
//! language: identifier and string quoting, row-limit syntax and which
//! aggregate functions exist. Anything a profile cannot express is reported
//! back as `None` so the translator can fail with a named operation instead
//! of emitting SQL the target would reject.

use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::{
    AnsiDialect as SqlParserAnsi, Dialect, DuckDbDialect as SqlParserDuckDb,
    SnowflakeDialect as SqlParserSnowflake,
};
use sqlparser::parser::Parser;
use std::fmt;
use std::str::FromStr;

use crate::error::{SqlError, SqlResult};

/// Dialect selector used in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// DuckDB (default)
    #[default]
    DuckDb,
    /// Snowflake
    Snowflake,
    /// Plain ANSI SQL
    Ansi,
}

impl DialectKind {
    /// Build the profile for this dialect
    pub fn profile(self) -> Box<dyn SqlDialect> {
        match self {
            DialectKind::DuckDb => Box::new(DuckDbDialect::new()),
            DialectKind::Snowflake => Box::new(SnowflakeDialect::new()),
            DialectKind::Ansi => Box::new(AnsiDialect::new()),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectKind::DuckDb => write!(f, "duckdb"),
            DialectKind::Snowflake => write!(f, "snowflake"),
            DialectKind::Ansi => write!(f, "ansi"),
        }
    }
}

impl FromStr for DialectKind {
    type Err = SqlError;

    fn from_str(name: &str) -> SqlResult<Self> {
        match name.to_lowercase().as_str() {
            "duckdb" => Ok(DialectKind::DuckDb),
            "snowflake" => Ok(DialectKind::Snowflake),
            "ansi" => Ok(DialectKind::Ansi),
            _ => Err(SqlError::UnknownDialect(name.to_string())),
        }
    }
}

/// How a row limit is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSyntax {
    /// `LIMIT n`
    Limit,
    /// `FETCH FIRST n ROWS ONLY`
    FetchFirst,
}

/// Aggregate functions the query builder knows how to request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    /// `COUNT(*)`
    CountStar,
    /// `COUNT(expr)`
    Count,
    /// `COUNT(DISTINCT expr)`
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
    Median,
}

impl AggregateFunction {
    /// Whether the function takes an argument expression
    pub fn takes_argument(self) -> bool {
        !matches!(self, AggregateFunction::CountStar)
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunction::CountStar => "count(*)",
            AggregateFunction::Count => "count",
            AggregateFunction::CountDistinct => "count_distinct",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Median => "median",
        };
        write!(f, "{}", name)
    }
}

/// Trait for SQL dialect implementations
pub trait SqlDialect: Send + Sync {
    /// Get the underlying sqlparser dialect
    fn parser_dialect(&self) -> &dyn Dialect;

    /// Parse SQL into AST statements
    fn parse(&self, sql: &str) -> SqlResult<Vec<Statement>> {
        Parser::parse_sql(self.parser_dialect(), sql).map_err(|e| {
            let msg = e.to_string();
            let (line, column) = parse_location_from_error(&msg);
            SqlError::ParseError {
                message: msg,
                line,
                column,
            }
        })
    }

    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Selector for this profile
    fn kind(&self) -> DialectKind;

    /// Quote an identifier for this dialect
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Quote a string literal for this dialect
    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Row-limit syntax
    fn limit_syntax(&self) -> LimitSyntax {
        LimitSyntax::Limit
    }

    /// SQL function name for an aggregate, `None` if the dialect lacks it
    fn aggregate_function(&self, func: AggregateFunction) -> Option<&'static str> {
        ansi_aggregate(func)
    }

    /// Render a row-limit clause
    fn render_limit(&self, n: u64) -> String {
        match self.limit_syntax() {
            LimitSyntax::Limit => format!("LIMIT {}", n),
            LimitSyntax::FetchFirst => format!("FETCH FIRST {} ROWS ONLY", n),
        }
    }
}

/// Parse line and column from sqlparser error message.
///
/// sqlparser's `ParserError` is a simple string wrapper with no structured
/// location data, so we extract "Line: N, Column: M" from the error message text.
fn parse_location_from_error(msg: &str) -> (usize, usize) {
    let Some(line_idx) = msg.find("Line: ") else {
        return (0, 0);
    };
    let line_start = line_idx + 6;
    let Some(comma_idx) = msg[line_start..].find(',') else {
        return (0, 0);
    };
    let Ok(line) = msg[line_start..line_start + comma_idx]
        .trim()
        .parse::<usize>()
    else {
        return (0, 0);
    };
    let Some(col_idx) = msg.find("Column: ") else {
        return (0, 0);
    };
    let col_start = col_idx + 8;
    let col_end = msg[col_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| col_start + i)
        .unwrap_or(msg.len());
    let Ok(column) = msg[col_start..col_end].trim().parse::<usize>() else {
        return (0, 0);
    };
    (line, column)
}

/// DuckDB SQL dialect
pub struct DuckDbDialect {
    dialect: SqlParserDuckDb,
}

impl DuckDbDialect {
    /// Create a new DuckDB dialect
    pub fn new() -> Self {
        Self {
            dialect: SqlParserDuckDb {},
        }
    }
}

impl Default for DuckDbDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for DuckDbDialect {
    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::DuckDb
    }

    fn aggregate_function(&self, func: AggregateFunction) -> Option<&'static str> {
        match func {
            AggregateFunction::Median => Some("MEDIAN"),
            other => ansi_aggregate(other),
        }
    }
}

/// Snowflake SQL dialect
pub struct SnowflakeDialect {
    dialect: SqlParserSnowflake,
}

impl SnowflakeDialect {
    /// Create a new Snowflake dialect
    pub fn new() -> Self {
        Self {
            dialect: SqlParserSnowflake {},
        }
    }
}

impl Default for SnowflakeDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for SnowflakeDialect {
    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Snowflake
    }

    fn aggregate_function(&self, func: AggregateFunction) -> Option<&'static str> {
        match func {
            AggregateFunction::Median => Some("MEDIAN"),
            other => ansi_aggregate(other),
        }
    }
}

/// ANSI SQL dialect
pub struct AnsiDialect {
    dialect: SqlParserAnsi,
}

impl AnsiDialect {
    /// Create a new ANSI dialect
    pub fn new() -> Self {
        Self {
            dialect: SqlParserAnsi {},
        }
    }
}

impl Default for AnsiDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for AnsiDialect {
    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn name(&self) -> &'static str {
        "ansi"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Ansi
    }

    fn limit_syntax(&self) -> LimitSyntax {
        LimitSyntax::FetchFirst
    }
}

fn ansi_aggregate(func: AggregateFunction) -> Option<&'static str> {
    match func {
        AggregateFunction::CountStar
        | AggregateFunction::Count
        | AggregateFunction::CountDistinct => Some("COUNT"),
        AggregateFunction::Sum => Some("SUM"),
        AggregateFunction::Avg => Some("AVG"),
        AggregateFunction::Min => Some("MIN"),
        AggregateFunction::Max => Some("MAX"),
        AggregateFunction::Median => None,
    }
}

#[cfg(test)]
#[path = "dialect_test.rs"]
mod tests;
