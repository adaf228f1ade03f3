//! Materialized query results

use lq_db::{QueryRows, TableData, Value};
use std::sync::Arc;

/// Rows returned by one materialization, in engine order
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedResult {
    columns: Arc<[String]>,
    rows: Vec<Row>,
}

/// One result row; values are addressed by position or column name
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Value of `column`, matched case-insensitively
    pub fn get(&self, column: &str) -> Option<&Value> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))?;
        self.values.get(idx)
    }

    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// (column, value) pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl RealizedResult {
    pub(crate) fn from_query_rows(rows: QueryRows) -> Self {
        let columns: Arc<[String]> = Arc::from(rows.columns);
        let rows = rows
            .rows
            .into_iter()
            .map(|values| Row {
                columns: Arc::clone(&columns),
                values,
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one column, `None` if there is no such column
    pub fn column_values(&self, column: &str) -> Option<Vec<&Value>> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))?;
        Some(self.rows.iter().filter_map(|r| r.values.get(idx)).collect())
    }

    /// Row values without column names
    pub fn to_vecs(&self) -> Vec<Vec<Value>> {
        self.rows.iter().map(|r| r.values.clone()).collect()
    }

    /// Convert into loadable table data, e.g. to copy it into another session
    pub fn into_table_data(self) -> TableData {
        TableData {
            columns: self.columns.to_vec(),
            rows: self.rows.into_iter().map(Row::into_values).collect(),
        }
    }
}

impl IntoIterator for RealizedResult {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a RealizedResult {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RealizedResult {
        RealizedResult::from_query_rows(QueryRows {
            columns: vec!["a".to_string(), "b".to_string()],
            rows: vec![
                vec![Value::Integer(1), Value::Text("x".to_string())],
                vec![Value::Integer(2), Value::Null],
            ],
        })
    }

    #[test]
    fn test_row_lookup_by_name() {
        let result = sample();
        assert_eq!(result.num_rows(), 2);
        assert_eq!(result.rows()[0].get("A"), Some(&Value::Integer(1)));
        assert_eq!(result.rows()[1].get("b"), Some(&Value::Null));
        assert_eq!(result.rows()[0].get("missing"), None);
    }

    #[test]
    fn test_column_values() {
        let result = sample();
        let a = result.column_values("a").unwrap();
        assert_eq!(a, vec![&Value::Integer(1), &Value::Integer(2)]);
        assert!(result.column_values("c").is_none());
    }

    #[test]
    fn test_into_table_data() {
        let data = sample().into_table_data();
        assert_eq!(data.columns, vec!["a", "b"]);
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.first_ragged_row(), None);
    }

    #[test]
    fn test_empty_result() {
        let result = RealizedResult::from_query_rows(QueryRows {
            columns: vec!["n".to_string()],
            rows: vec![],
        });
        assert!(result.is_empty());
        assert_eq!(result.columns(), &["n".to_string()]);
        assert!(result.to_vecs().is_empty());
    }
}
