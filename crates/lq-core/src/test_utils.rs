//! Shared test utilities for lq-core

use crate::session::Session;
use async_trait::async_trait;
use lq_db::{
    CreateTableOptions, Database, DbResult, DuckDbBackend, QueryRows, TableData, Value,
};
use lq_sql::DialectKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory DuckDB that counts every engine call
pub(crate) struct CountingDatabase {
    inner: DuckDbBackend,
    calls: AtomicUsize,
    /// Extra latency added to every `query` call
    query_delay: Option<Duration>,
}

impl CountingDatabase {
    pub(crate) fn new() -> Self {
        Self {
            inner: DuckDbBackend::in_memory().unwrap(),
            calls: AtomicUsize::new(0),
            query_delay: None,
        }
    }

    pub(crate) fn with_query_delay(delay: Duration) -> Self {
        Self {
            query_delay: Some(delay),
            ..Self::new()
        }
    }

    /// Engine calls made so far
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Run setup statements directly, without counting them
    pub(crate) fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.inner.execute_batch(sql)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Database for CountingDatabase {
    async fn query(&self, sql: &str) -> DbResult<QueryRows> {
        self.hit();
        if let Some(delay) = self.query_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.query(sql).await
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        self.hit();
        self.inner.query_count(sql).await
    }

    async fn describe_query(&self, sql: &str) -> DbResult<Vec<(String, String)>> {
        self.hit();
        self.inner.describe_query(sql).await
    }

    async fn table_columns(&self, name: &str) -> DbResult<Vec<String>> {
        self.hit();
        self.inner.table_columns(name).await
    }

    async fn create_table(
        &self,
        name: &str,
        data: &TableData,
        options: CreateTableOptions,
    ) -> DbResult<()> {
        self.hit();
        self.inner.create_table(name, data, options).await
    }

    async fn create_index(
        &self,
        table: &str,
        index_name: &str,
        columns: &[String],
    ) -> DbResult<()> {
        self.hit();
        self.inner.create_index(table, index_name, columns).await
    }

    fn db_type(&self) -> &'static str {
        "counting-duckdb"
    }
}

/// `t(a, b)` with rows (1, 10), (2, 20), (3, 30)
pub(crate) fn sample_table() -> TableData {
    TableData::new(
        ["a", "b"],
        vec![
            vec![Value::Integer(1), Value::Integer(10)],
            vec![Value::Integer(2), Value::Integer(20)],
            vec![Value::Integer(3), Value::Integer(30)],
        ],
    )
}

/// Session over a counting in-memory DuckDB
pub(crate) fn counting_session(dialect: DialectKind) -> (Session, Arc<CountingDatabase>) {
    let db = Arc::new(CountingDatabase::new());
    let session = Session::with_database(db.clone(), dialect);
    (session, db)
}

/// DuckDB-dialect session with table `t` already loaded
pub(crate) async fn loaded_session() -> (Session, Arc<CountingDatabase>) {
    let (session, db) = counting_session(DialectKind::DuckDb);
    session.load_table("t", sample_table(), &[]).await.unwrap();
    (session, db)
}

/// Integer values of one result column
pub(crate) fn ints(values: Vec<&Value>) -> Vec<i64> {
    values.into_iter().filter_map(Value::as_i64).collect()
}
