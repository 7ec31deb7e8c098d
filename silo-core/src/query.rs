use crate::{SqlType, Value, truncate_long};
use std::{
    fmt::{self, Display},
    sync::Arc,
};

/// SQL text with its positional arguments, ready to be sent to an [`Executor`](crate::Executor).
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Query {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

impl From<&str> for Query {
    fn from(value: &str) -> Self {
        Query::new(value, Vec::new())
    }
}

impl From<String> for Query {
    fn from(value: String) -> Self {
        Query::new(value, Vec::new())
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", truncate_long!(self.sql))?;
        if !self.args.is_empty() {
            write!(f, " {:?}", self.args)?;
        }
        Ok(())
    }
}

/// Metadata about modify operations (INSERT/UPDATE/DELETE).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    /// Total number of rows impacted.
    pub rows_affected: u64,
    /// Backend-specific last inserted identifier when available.
    pub last_affected_id: Option<i64>,
}

/// Name and driver type of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLabel {
    pub name: String,
    pub sql_type: SqlType,
}

impl ColumnLabel {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// Labels shared by every row of one result.
pub type RowLabels = Arc<[ColumnLabel]>;
/// Owned row value slice matching `RowLabels` length.
pub type Row = Box<[Value]>;

/// A result row with its corresponding column labels.
#[derive(Debug, Clone)]
pub struct RowLabeled {
    /// Column labels.
    pub labels: RowLabels,
    /// Data values (aligned by index with `labels`).
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowLabels, values: Row) -> Self {
        Self { labels, values }
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(name))
            .map(|i| &self.values[i])
    }
}

/// Heterogeneous items emitted by `Executor::run` combining rows and modify results.
#[derive(Debug)]
pub enum QueryResult {
    /// A labeled row.
    Row(RowLabeled),
    /// A modify effect aggregation.
    Affected(RowsAffected),
}

impl Extend<RowsAffected> for RowsAffected {
    fn extend<T: IntoIterator<Item = RowsAffected>>(&mut self, iter: T) {
        for elem in iter {
            self.rows_affected += elem.rows_affected;
            if elem.last_affected_id.is_some() {
                self.last_affected_id = elem.last_affected_id;
            }
        }
    }
}

impl From<RowLabeled> for QueryResult {
    fn from(value: RowLabeled) -> Self {
        QueryResult::Row(value)
    }
}

impl From<RowsAffected> for QueryResult {
    fn from(value: RowsAffected) -> Self {
        QueryResult::Affected(value)
    }
}
