//! # Jobs
//!
//! Cron-triggered SQL batches. Each job moves between two states:
//!
//! ```text
//! not started --start()--> started --stop()--> not started
//! ```
//!
//! `start` fails when the job is already registered and `stop` fails when
//! it is not; `restart` tolerates a job that was not running.

mod errors;
mod runner;
mod scheduler;

pub use errors::{JobError, JobResult};
pub use runner::JobRunner;
pub use scheduler::{FiringOutcome, JobScheduler};

use croner::Cron;

use crate::master::Job;

/// Lifecycle control over scheduled jobs
pub trait JobControl: Send + Sync {
    fn start(&self, job: &Job) -> JobResult<()>;

    fn stop(&self, job_id: &str) -> JobResult<()>;

    fn is_started(&self, job_id: &str) -> bool;

    fn restart(&self, job: &Job) -> JobResult<()> {
        match self.stop(&job.id) {
            Ok(()) | Err(JobError::NotStarted(_)) => self.start(job),
            Err(e) => Err(e),
        }
    }
}

/// Parse a cron expression; a leading seconds field is optional
pub fn parse_cron(expr: &str) -> JobResult<Cron> {
    Cron::new(expr.trim())
        .with_seconds_optional()
        .parse()
        .map_err(|e| JobError::InvalidCron {
            expr: expr.to_string(),
            reason: e.to_string(),
        })
}
