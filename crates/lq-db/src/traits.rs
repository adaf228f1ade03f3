//! Database trait definition

use crate::error::DbResult;
use crate::value::{QueryRows, TableData};
use async_trait::async_trait;

/// How `create_table` treats an existing relation of the same name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateTableOptions {
    /// Replace an existing table instead of failing
    pub replace: bool,
    /// Create a connection-local temporary table
    pub temporary: bool,
}

/// Backing engine for Lazyquery sessions
///
/// Implementations must be Send + Sync for async operation.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a query and return all rows with their column names
    async fn query(&self, sql: &str) -> DbResult<QueryRows>;

    /// Count the rows a query would return
    async fn query_count(&self, sql: &str) -> DbResult<usize>;

    /// Output columns of a query as (name, type) pairs, without running it
    async fn describe_query(&self, sql: &str) -> DbResult<Vec<(String, String)>>;

    /// Column names of an existing table or view, in ordinal order
    async fn table_columns(&self, name: &str) -> DbResult<Vec<String>>;

    /// Create a table and bulk-load it from in-memory rows
    async fn create_table(
        &self,
        name: &str,
        data: &TableData,
        options: CreateTableOptions,
    ) -> DbResult<()>;

    /// Create a secondary index over `columns` of `table`
    async fn create_index(&self, table: &str, index_name: &str, columns: &[String])
        -> DbResult<()>;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;
}
