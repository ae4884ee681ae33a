//! # Backend Traits
//!
//! The engine talks to tenant databases only through these traits, so the
//! MySQL backend and the in-memory store are interchangeable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::errors::SqlResult;

/// Boxed, sendable future used at every async trait seam
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One result row keyed by column name
pub type Row = Map<String, Value>;

/// Column headers plus positional row values
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Convert to keyed rows
    pub fn to_maps(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Row>()
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Outcome of one statement inside an exec batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatementResult {
    /// Rows affected by a write statement
    RowsAffected(u64),
    /// Rows returned by a read statement
    Rows(Vec<Row>),
    /// A value substituted by an after-hook, e.g. a session token
    Replaced(Value),
}

impl StatementResult {
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            StatementResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

/// A transaction opened for exactly one call
pub trait SqlTransaction: Send {
    /// Execute a write statement, returning rows affected
    fn execute<'a>(&'a mut self, sql: &'a str, params: &'a [Value])
        -> BoxFuture<'a, SqlResult<u64>>;

    /// Execute a read statement
    fn query<'a>(&'a mut self, sql: &'a str, params: &'a [Value])
        -> BoxFuture<'a, SqlResult<RowSet>>;

    fn commit(self: Box<Self>) -> BoxFuture<'static, SqlResult<()>>;

    fn rollback(self: Box<Self>) -> BoxFuture<'static, SqlResult<()>>;
}

/// Opens transactions against one tenant database
pub trait SqlConnector: Send + Sync {
    fn begin(&self) -> BoxFuture<'_, SqlResult<Box<dyn SqlTransaction>>>;
}

impl<T: SqlConnector + ?Sized> SqlConnector for Arc<T> {
    fn begin(&self) -> BoxFuture<'_, SqlResult<Box<dyn SqlTransaction>>> {
        (**self).begin()
    }
}
