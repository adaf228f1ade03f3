//! DuckDB database backend implementation

use crate::error::{DbError, DbResult};
use crate::traits::{CreateTableOptions, Database};
use crate::value::{QueryRows, TableData, Value};
use async_trait::async_trait;
use duckdb::types::Value as DuckValue;
use duckdb::{params_from_iter, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// DuckDB database backend
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    /// Execute one or more statements without returning rows
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| DbError::ExecutionError(format!("{}: {}", e, sql)))
    }

    /// Run a query and collect every row synchronously
    fn query_sync(&self, sql: &str) -> DbResult<QueryRows> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(DbError::from)?;

        // Column metadata is only available once the statement has run,
        // so rows are collected before reading names.
        let rows: Vec<Vec<Value>> = stmt
            .query_map([], |row| {
                let col_count = row.as_ref().column_count();
                (0..col_count)
                    .map(|i| row.get::<_, DuckValue>(i).map(from_duckdb))
                    .collect()
            })
            .map_err(DbError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)?;

        let columns = (0..stmt.column_count())
            .map(|i| stmt.column_name(i).map_or("?".to_string(), |v| v.to_string()))
            .collect();

        Ok(QueryRows { columns, rows })
    }

    /// Query count synchronously
    fn query_count_sync(&self, sql: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM ({})", sql), [], |row| {
                row.get(0)
            })
            .map_err(DbError::from)?;
        Ok(count as usize)
    }

    fn table_columns_sync(&self, name: &str) -> DbResult<Vec<String>> {
        let conn = self.lock()?;
        let (schema, table) = split_qualified(name);

        let mut stmt = conn
            .prepare(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
            )
            .map_err(DbError::from)?;
        let columns = stmt
            .query_map(duckdb::params![schema, table], |row| row.get::<_, String>(0))
            .map_err(DbError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)?;

        if columns.is_empty() {
            return Err(DbError::TableNotFound(name.to_string()));
        }
        Ok(columns)
    }

    fn create_table_sync(
        &self,
        name: &str,
        data: &TableData,
        options: CreateTableOptions,
    ) -> DbResult<()> {
        if data.columns.is_empty() {
            return Err(DbError::LoadError {
                table: name.to_string(),
                message: "no columns".to_string(),
            });
        }
        if let Some(idx) = data.first_ragged_row() {
            return Err(DbError::LoadError {
                table: name.to_string(),
                message: format!(
                    "row {} has {} values, expected {}",
                    idx,
                    data.rows[idx].len(),
                    data.columns.len()
                ),
            });
        }

        let column_defs = data
            .columns
            .iter()
            .zip(data.column_types())
            .map(|(col, ty)| format!("{} {}", quote_ident(col), ty.sql_name()))
            .collect::<Vec<_>>()
            .join(", ");
        let create = format!(
            "CREATE {}{}TABLE {} ({})",
            if options.replace { "OR REPLACE " } else { "" },
            if options.temporary { "TEMP " } else { "" },
            quote_qualified(name),
            column_defs
        );
        let insert = format!(
            "INSERT INTO {} VALUES ({})",
            quote_qualified(name),
            vec!["?"; data.columns.len()].join(", ")
        );

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(DbError::from)?;
        tx.execute_batch(&create)
            .map_err(|e| DbError::ExecutionError(format!("{}: {}", e, create)))?;
        {
            let mut stmt = tx.prepare(&insert).map_err(DbError::from)?;
            for row in &data.rows {
                stmt.execute(params_from_iter(row.iter().map(to_duckdb)))
                    .map_err(|e| DbError::LoadError {
                        table: name.to_string(),
                        message: e.to_string(),
                    })?;
            }
        }
        tx.commit().map_err(DbError::from)?;
        Ok(())
    }
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn query(&self, sql: &str) -> DbResult<QueryRows> {
        self.query_sync(sql)
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        self.query_count_sync(sql)
    }

    async fn describe_query(&self, sql: &str) -> DbResult<Vec<(String, String)>> {
        let described = self.query_sync(&format!("DESCRIBE {}", sql))?;
        Ok(described
            .rows
            .into_iter()
            .map(|row| {
                let mut cells = row.into_iter().map(|v| v.to_string());
                let name = cells.next().unwrap_or_default();
                let ty = cells.next().unwrap_or_default();
                (name, ty)
            })
            .collect())
    }

    async fn table_columns(&self, name: &str) -> DbResult<Vec<String>> {
        self.table_columns_sync(name)
    }

    async fn create_table(
        &self,
        name: &str,
        data: &TableData,
        options: CreateTableOptions,
    ) -> DbResult<()> {
        self.create_table_sync(name, data, options)
    }

    async fn create_index(
        &self,
        table: &str,
        index_name: &str,
        columns: &[String],
    ) -> DbResult<()> {
        let cols = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(index_name),
            quote_qualified(table),
            cols
        );
        self.execute_batch(&sql)
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

/// Split `schema.table` into its parts, defaulting the schema to `main`
fn split_qualified(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) => (&name[..pos], &name[pos + 1..]),
        None => ("main", name),
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_qualified(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

fn to_duckdb(value: &Value) -> DuckValue {
    match value {
        Value::Null => DuckValue::Null,
        Value::Boolean(b) => DuckValue::Boolean(*b),
        Value::Integer(n) => DuckValue::BigInt(*n),
        Value::Float(x) => DuckValue::Double(*x),
        Value::Text(s) => DuckValue::Text(s.clone()),
    }
}

fn from_duckdb(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Boolean(b),
        DuckValue::TinyInt(n) => Value::Integer(n.into()),
        DuckValue::SmallInt(n) => Value::Integer(n.into()),
        DuckValue::Int(n) => Value::Integer(n.into()),
        DuckValue::BigInt(n) => Value::Integer(n),
        DuckValue::HugeInt(n) => i64::try_from(n)
            .map(Value::Integer)
            .unwrap_or(Value::Float(n as f64)),
        DuckValue::UTinyInt(n) => Value::Integer(n.into()),
        DuckValue::USmallInt(n) => Value::Integer(n.into()),
        DuckValue::UInt(n) => Value::Integer(n.into()),
        DuckValue::UBigInt(n) => i64::try_from(n)
            .map(Value::Integer)
            .unwrap_or(Value::Float(n as f64)),
        DuckValue::Float(x) => Value::Float(x.into()),
        DuckValue::Double(x) => Value::Float(x),
        DuckValue::Decimal(d) => {
            let text = d.to_string();
            text.parse::<f64>()
                .map(Value::Float)
                .unwrap_or(Value::Text(text))
        }
        DuckValue::Text(s) => Value::Text(s),
        other => Value::Text(format!("{:?}", other)),
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
