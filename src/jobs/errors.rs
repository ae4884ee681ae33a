//! # Job Errors

use thiserror::Error;

use crate::sql::SqlError;

/// Result type for job operations
pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("Job already started: {0}")]
    AlreadyStarted(String),

    #[error("Job not started: {0}")]
    NotStarted(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("Job firing cancelled")]
    Cancelled,

    #[error("Job scheduler is not running on this node")]
    Unavailable,

    #[error(transparent)]
    Sql(#[from] SqlError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_messages() {
        assert_eq!(
            JobError::AlreadyStarted("j1".into()).to_string(),
            "Job already started: j1"
        );
        assert_eq!(JobError::NotStarted("j1".into()).to_string(), "Job not started: j1");
    }
}
