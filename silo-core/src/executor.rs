use crate::{
    Query, QueryResult, Result, RowLabeled, RowsAffected, SqlWriter,
    stream::{Stream, StreamExt, TryStreamExt},
};
use std::future::Future;

/// Anything able to run SQL and stream back rows or modify counts.
///
/// Only `run` is required, `fetch` and `execute` filter its output.
pub trait Executor: Send {
    type SqlWriter: SqlWriter;

    fn sql_writer(&self) -> Self::SqlWriter;

    /// General method to send any query and return any result type (either row or count)
    fn run(&mut self, query: Query) -> impl Stream<Item = Result<QueryResult>> + Send;

    /// Execute the query and returns the rows.
    fn fetch(&mut self, query: Query) -> impl Stream<Item = Result<RowLabeled>> + Send {
        self.run(query).filter_map(|v| async move {
            match v {
                Ok(QueryResult::Row(v)) => Some(Ok(v)),
                Err(e) => Some(Err(e)),
                _ => None,
            }
        })
    }

    /// Execute the query and return the total number of rows affected.
    fn execute(&mut self, query: Query) -> impl Future<Output = Result<RowsAffected>> + Send {
        self.run(query)
            .filter_map(|v| async move {
                match v {
                    Ok(QueryResult::Affected(v)) => Some(Ok(v)),
                    Err(e) => Some(Err(e)),
                    _ => None,
                }
            })
            .try_collect()
    }
}
