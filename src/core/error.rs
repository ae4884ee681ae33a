//! Core Error Types
//!
//! Errors raised while running a data-plane operation through the
//! interceptor pipeline. Errors from the SQL engine and the token checks
//! pass through with their own text.

use thiserror::Error;

use crate::auth::AuthError;
use crate::sql::SqlError;

/// Core module result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error("App not found: {0}")]
    AppNotFound(String),

    #[error("Query not found: {0}")]
    QueryNotFound(String),

    /// A before-hook returned `false` without an error
    #[error("Operation halted by interceptor: {0}")]
    Halted(String),

    #[error("Invalid criteria '{criteria}': {reason}")]
    Criteria { criteria: String, reason: String },

    /// Remote interceptor answered with a non-200 status
    #[error("Client rejected.")]
    RemoteRejected { url: String, status: u16 },

    #[error("Remote call failed: {0}")]
    Transport(String),

    #[error("Invalid payload: {0}")]
    Payload(String),
}

impl CoreError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Auth(e) => e.status_code(),
            Self::AppNotFound(_) | Self::QueryNotFound(_) => 404,
            Self::Halted(_) => 403,
            Self::Criteria { .. } | Self::Payload(_) => 400,
            Self::RemoteRejected { .. } | Self::Transport(_) => 502,
            Self::Sql(SqlError::ParamCount { .. }) => 400,
            Self::Sql(_) => 500,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Payload(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_errors_keep_their_text() {
        let e: CoreError = SqlError::Database("Duplicate entry 'x'".into()).into();
        assert_eq!(e.to_string(), "Duplicate entry 'x'");

        let e: CoreError = AuthError::AccessDenied.into();
        assert_eq!(e.to_string(), "Authentication failed.");
        assert_eq!(e.status_code(), 401);
    }

    #[test]
    fn test_remote_rejection_text() {
        let e = CoreError::RemoteRejected {
            url: "http://hook".into(),
            status: 500,
        };
        assert_eq!(e.to_string(), "Client rejected.");
    }
}
