//! # SQL Errors

use thiserror::Error;

/// Result type for script execution
pub type SqlResult<T> = Result<T, SqlError>;

/// Errors raised while preparing or executing a SQL batch
#[derive(Debug, Clone, Error)]
pub enum SqlError {
    /// More `?` placeholders than bound parameters
    #[error("Incorrect param count. Expected: {expected} actual: {actual}")]
    ParamCount { expected: usize, actual: usize },

    /// A statement failed; the text is the database's own message
    #[error("{0}")]
    Database(String),

    #[error("Failed to open query file: {0}")]
    ScriptNotFound(String),

    #[error("File not found: {0}")]
    ScriptUnreadable(String),

    #[error("Query not found: {0}")]
    QueryNotFound(String),

    #[error("App not found: {0}")]
    AppNotFound(String),

    #[error("Data node not found: {0}")]
    DataNodeNotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<sqlx::Error> for SqlError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => SqlError::Database(db.message().to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                SqlError::Connection(e.to_string())
            }
            other => SqlError::Database(other.to_string()),
        }
    }
}
