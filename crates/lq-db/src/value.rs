//! Values exchanged with the engine

use std::fmt;

/// A single scalar cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// BOOLEAN
    Boolean(bool),
    /// Any integer type that fits in 64 bits
    Integer(i64),
    /// Floating point and decimal values
    Float(f64),
    /// VARCHAR and anything rendered as text
    Text(String),
}

impl Value {
    /// Whether this is SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer payload, if any
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric payload widened to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean payload, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Column type this value would be stored as, `None` for NULL
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(ColumnType::Boolean),
            Value::Integer(_) => Some(ColumnType::BigInt),
            Value::Float(_) => Some(ColumnType::Double),
            Value::Text(_) => Some(ColumnType::Varchar),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// SQL column type used when creating tables from in-memory rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    BigInt,
    Double,
    Varchar,
}

impl ColumnType {
    /// Narrowest type able to hold values of both `self` and `other`
    pub fn widen(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (BigInt, Double) | (Double, BigInt) => Double,
            _ => Varchar,
        }
    }

    /// Type name as written in DDL
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Varchar => "VARCHAR",
        }
    }
}

/// In-memory rows used to bulk-load a table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
    /// Column names, in order
    pub columns: Vec<String>,
    /// Rows, each with one value per column
    pub rows: Vec<Vec<Value>>,
}

impl TableData {
    /// Create table data from column names and rows
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Infer one column type per column.
    ///
    /// Columns holding only NULLs (or no rows at all) become VARCHAR.
    pub fn column_types(&self) -> Vec<ColumnType> {
        (0..self.columns.len())
            .map(|idx| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(idx).and_then(Value::column_type))
                    .reduce(ColumnType::widen)
                    .unwrap_or(ColumnType::Varchar)
            })
            .collect()
    }

    /// Index of the first row whose width differs from the column count
    pub fn first_ragged_row(&self) -> Option<usize> {
        self.rows.iter().position(|r| r.len() != self.columns.len())
    }
}

/// Rows returned by the engine for a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    /// Column names reported by the engine
    pub columns: Vec<String>,
    /// Result rows in engine order
    pub rows: Vec<Vec<Value>>,
}
