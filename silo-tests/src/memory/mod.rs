mod sql;

use async_stream::try_stream;
use silo::{
    Bean, ColumnLabel, Error, Executor, GenericSqlWriter, Query, QueryResult, Result, RowLabeled,
    RowLabels, RowsAffected, SqlType, Value, stream::Stream,
};
use sql::{Condition, Parser, Statement, compare};
use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

#[derive(Debug)]
struct MemoryTable {
    labels: RowLabels,
    auto_increment: Option<usize>,
    next_id: i64,
    rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    fn column(&self, name: &str) -> Result<usize> {
        self.labels
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| Error::msg(format!("No such column: `{name}`")))
    }

    fn matches(&self, row: &[Value], condition: &Condition) -> Result<bool> {
        Ok(match condition {
            Condition::Or(terms) => {
                for term in terms {
                    if self.matches(row, term)? {
                        return Ok(true);
                    }
                }
                false
            }
            Condition::And(terms) => {
                for term in terms {
                    if !self.matches(row, term)? {
                        return Ok(false);
                    }
                }
                true
            }
            Condition::Not(term) => !self.matches(row, term)?,
            Condition::IsNull(column, null) => row[self.column(column)?].is_null() == *null,
            Condition::In(column, values) => {
                let cell = &row[self.column(column)?];
                values
                    .iter()
                    .any(|v| compare(cell, v) == Some(Ordering::Equal))
            }
            Condition::Compare(column, operator, value) => {
                let Some(ordering) = compare(&row[self.column(column)?], value) else {
                    return Ok(false);
                };
                match *operator {
                    "=" => ordering.is_eq(),
                    "!=" => ordering.is_ne(),
                    "<" => ordering.is_lt(),
                    "<=" => ordering.is_le(),
                    ">" => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }
            }
        })
    }

    fn filtered(&self, filter: &Option<Condition>) -> Result<Vec<usize>> {
        let mut result = Vec::new();
        for (i, row) in self.rows.iter().enumerate() {
            if filter
                .as_ref()
                .map_or(Ok(true), |v| self.matches(row, v))?
            {
                result.push(i);
            }
        }
        Ok(result)
    }
}

#[derive(Debug, Default)]
struct Database {
    tables: HashMap<String, MemoryTable>,
}

impl Database {
    fn table(&mut self, name: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::msg(format!("No such table: `{name}`")))
    }

    fn run(&mut self, query: Query) -> Result<Vec<QueryResult>> {
        let statement = Parser::new(&query.sql, query.args)?.statement()?;
        match statement {
            Statement::Select {
                distinct,
                columns,
                table,
                filter,
                order_by,
                limit,
            } => {
                let table = self.table(&table)?;
                let projection = match columns {
                    Some(columns) => columns
                        .iter()
                        .map(|v| table.column(v))
                        .collect::<Result<Vec<_>>>()?,
                    None => (0..table.labels.len()).collect(),
                };
                let mut rows = table
                    .filtered(&filter)?
                    .into_iter()
                    .map(|i| &table.rows[i])
                    .collect::<Vec<_>>();
                for (column, descending) in order_by.iter().rev() {
                    let idx = table.column(column)?;
                    rows.sort_by(|a, b| {
                        let ordering = match (a[idx].is_null(), b[idx].is_null()) {
                            (true, true) => Ordering::Equal,
                            (true, false) => Ordering::Less,
                            (false, true) => Ordering::Greater,
                            _ => compare(&a[idx], &b[idx]).unwrap_or(Ordering::Equal),
                        };
                        if *descending {
                            ordering.reverse()
                        } else {
                            ordering
                        }
                    });
                }
                let labels: RowLabels = projection
                    .iter()
                    .map(|i| table.labels[*i].clone())
                    .collect();
                let mut seen = Vec::new();
                let mut result = Vec::new();
                for row in rows {
                    let values = projection
                        .iter()
                        .map(|i| row[*i].clone())
                        .collect::<Box<[Value]>>();
                    if distinct {
                        let fingerprint = values.iter().map(Value::to_json).collect::<Vec<_>>();
                        if seen.contains(&fingerprint) {
                            continue;
                        }
                        seen.push(fingerprint);
                    }
                    if limit.is_some_and(|v| result.len() >= v) {
                        break;
                    }
                    result.push(RowLabeled::new(labels.clone(), values).into());
                }
                Ok(result)
            }
            Statement::Insert {
                table,
                columns,
                rows,
            } => {
                let table = self.table(&table)?;
                let columns = columns
                    .iter()
                    .map(|v| table.column(v))
                    .collect::<Result<Vec<_>>>()?;
                let mut affected = RowsAffected::default();
                for values in rows {
                    if values.len() != columns.len() {
                        return Err(Error::msg("Values do not match the columns"));
                    }
                    let mut row = vec![Value::Null; table.labels.len()];
                    for (idx, value) in columns.iter().zip(values) {
                        row[*idx] = value;
                    }
                    if let Some(idx) = table.auto_increment {
                        let id = match row[idx].to_json().as_i64() {
                            Some(id) => {
                                table.next_id = table.next_id.max(id + 1);
                                id
                            }
                            None => {
                                let id = table.next_id;
                                table.next_id += 1;
                                row[idx] = Value::Int64(Some(id));
                                id
                            }
                        };
                        affected.last_affected_id = Some(id);
                    }
                    table.rows.push(row);
                    affected.rows_affected += 1;
                }
                Ok(vec![affected.into()])
            }
            Statement::Update {
                table,
                assignments,
                filter,
            } => {
                let table = self.table(&table)?;
                let assignments = assignments
                    .into_iter()
                    .map(|(column, value)| Ok((table.column(&column)?, value)))
                    .collect::<Result<Vec<_>>>()?;
                let matching = table.filtered(&filter)?;
                for i in &matching {
                    for (idx, value) in &assignments {
                        table.rows[*i][*idx] = value.clone();
                    }
                }
                Ok(vec![
                    RowsAffected {
                        rows_affected: matching.len() as u64,
                        last_affected_id: None,
                    }
                    .into(),
                ])
            }
            Statement::Delete { table, filter } => {
                let table = self.table(&table)?;
                let matching = table.filtered(&filter)?;
                let mut i = 0;
                table.rows.retain(|_| {
                    i += 1;
                    !matching.contains(&(i - 1))
                });
                Ok(vec![
                    RowsAffected {
                        rows_affected: matching.len() as u64,
                        last_affected_id: None,
                    }
                    .into(),
                ])
            }
            Statement::Truncate { table } => {
                let table = self.table(&table)?;
                let rows_affected = table.rows.len() as u64;
                table.rows.clear();
                table.next_id = 1;
                Ok(vec![
                    RowsAffected {
                        rows_affected,
                        last_affected_id: None,
                    }
                    .into(),
                ])
            }
        }
    }
}

/// Executor keeping its tables in memory, understands the statements generated by
/// [`GenericSqlWriter`] plus simple hand written ones.
///
/// Clones share the same tables and query log, like connections to the same database.
#[derive(Debug, Clone, Default)]
pub struct MemoryExecutor {
    database: Arc<Mutex<Database>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates (or recreates empty) the table described by `T`.
    pub fn create_table<T: Bean>(&self) {
        let table = T::describe();
        let labels = table
            .columns
            .iter()
            .map(|v| ColumnLabel::new(v.name.clone(), v.sql_type))
            .collect();
        self.create_table_with(table.name, labels, table.auto_increment);
    }

    /// Creates (or recreates empty) a table from its labels.
    pub fn create_table_with(
        &self,
        name: impl Into<String>,
        labels: Vec<ColumnLabel>,
        auto_increment: Option<usize>,
    ) {
        let mut database = self.database.lock().unwrap_or_else(PoisonError::into_inner);
        database.tables.insert(
            name.into(),
            MemoryTable {
                labels: labels.into(),
                auto_increment,
                next_id: 1,
                rows: Vec::new(),
            },
        );
    }

    /// Appends a row as is, no type checks: lets tests store values their beans cannot read.
    pub fn push_row(&self, table: &str, values: Vec<Value>) -> Result<()> {
        let mut database = self.database.lock().unwrap_or_else(PoisonError::into_inner);
        let table = database.table(table)?;
        if values.len() != table.labels.len() {
            return Err(Error::msg(format!(
                "Expected {} values, got {}",
                table.labels.len(),
                values.len()
            )));
        }
        table.rows.push(values);
        Ok(())
    }

    /// Copy of the stored rows of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Vec<Value>> {
        let database = self.database.lock().unwrap_or_else(PoisonError::into_inner);
        database
            .tables
            .get(table)
            .map(|v| v.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        let database = self.database.lock().unwrap_or_else(PoisonError::into_inner);
        database.tables.get(table).map_or(0, |v| v.rows.len())
    }

    /// Statements run so far, oldest first.
    pub fn queries(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of statements run so far starting with `prefix`.
    pub fn count_queries(&self, prefix: &str) -> usize {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|v| v.starts_with(prefix))
            .count()
    }

    pub fn clear_log(&self) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Executor for MemoryExecutor {
    type SqlWriter = GenericSqlWriter;

    fn sql_writer(&self) -> GenericSqlWriter {
        GenericSqlWriter
    }

    fn run(&mut self, query: Query) -> impl Stream<Item = Result<QueryResult>> + Send {
        let database = self.database.clone();
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.sql.clone());
        try_stream! {
            log::trace!("Running: {}", query);
            let results = {
                let mut database = database.lock().unwrap_or_else(PoisonError::into_inner);
                database.run(query)
            }?;
            for result in results {
                yield result;
            }
        }
    }
}

/// Labels of a table created by hand, each column given as `(name, type)`.
pub fn labels(columns: &[(&str, SqlType)]) -> Vec<ColumnLabel> {
    columns
        .iter()
        .map(|(name, sql_type)| ColumnLabel::new(*name, *sql_type))
        .collect()
}
