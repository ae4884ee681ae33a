//! # Job Scheduler
//!
//! One tokio task per started job sleeps until the next cron occurrence,
//! then spawns the firing as its own task. The firing's join result is
//! folded into a [`FiringOutcome`] so a failing or panicking firing is
//! logged and never stops the schedule.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::task::{JoinError, JoinHandle};

use super::errors::{JobError, JobResult};
use super::runner::JobRunner;
use super::{parse_cron, JobControl};
use crate::master::Job;

/// Result of one firing
#[derive(Debug)]
pub enum FiringOutcome {
    /// The main script ran this many times
    Completed(usize),
    Failed(JobError),
    Panicked(String),
}

impl FiringOutcome {
    pub fn from_join(result: Result<JobResult<usize>, JoinError>) -> Self {
        match result {
            Ok(Ok(executions)) => FiringOutcome::Completed(executions),
            Ok(Err(e)) => FiringOutcome::Failed(e),
            Err(join) if join.is_panic() => {
                let panic = join.into_panic();
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                FiringOutcome::Panicked(message)
            }
            Err(_) => FiringOutcome::Failed(JobError::Cancelled),
        }
    }

    fn log(&self, job: &Job) {
        match self {
            FiringOutcome::Completed(executions) => {
                tracing::debug!(job = %job.name, app_id = %job.app_id, executions, "job fired");
            }
            FiringOutcome::Failed(e) => {
                tracing::warn!(job = %job.name, app_id = %job.app_id, error = %e, "job firing failed");
            }
            FiringOutcome::Panicked(message) => {
                tracing::error!(job = %job.name, app_id = %job.app_id, panic = %message, "job firing panicked");
            }
        }
    }
}

pub struct JobScheduler {
    runner: JobRunner,
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new(runner: JobRunner) -> Self {
        Self {
            runner,
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ids of all started jobs
    pub fn started(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handles().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop every job
    pub fn shutdown(&self) {
        for (_, handle) in self.handles().drain() {
            handle.abort();
        }
    }

    fn spawn_schedule(&self, job: Job) -> JobResult<JoinHandle<()>> {
        let cron = parse_cron(&job.cron)?;
        let runner = self.runner.clone();
        Ok(tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = match cron.find_next_occurrence(&now, false) {
                    Ok(next) => next,
                    Err(e) => {
                        tracing::error!(job = %job.name, error = %e, "no next occurrence, schedule ended");
                        return;
                    }
                };
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                let firing_runner = runner.clone();
                let firing_job = job.clone();
                let firing =
                    tokio::spawn(async move { firing_runner.fire(&firing_job).await });
                let logged_job = job.clone();
                tokio::spawn(async move {
                    FiringOutcome::from_join(firing.await).log(&logged_job);
                });
            }
        }))
    }
}

impl JobControl for JobScheduler {
    fn start(&self, job: &Job) -> JobResult<()> {
        let mut handles = self.handles();
        if handles.contains_key(&job.id) {
            return Err(JobError::AlreadyStarted(job.id.clone()));
        }
        let handle = self.spawn_schedule(job.clone())?;
        handles.insert(job.id.clone(), handle);
        tracing::info!(job = %job.name, cron = %job.cron, "job started");
        Ok(())
    }

    fn stop(&self, job_id: &str) -> JobResult<()> {
        let handle = self
            .handles()
            .remove(job_id)
            .ok_or_else(|| JobError::NotStarted(job_id.to_string()))?;
        handle.abort();
        tracing::info!(job_id, "job stopped");
        Ok(())
    }

    fn is_started(&self, job_id: &str) -> bool {
        self.handles().contains_key(job_id)
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::master::{MasterData, MasterStore};
    use crate::sql::memory::MemoryConnector;
    use crate::sql::{ConnectorRegistry, SharedConnectorFactory};

    fn scheduler() -> JobScheduler {
        let store = MasterStore::new(MasterData::default());
        let registry = ConnectorRegistry::new(Arc::new(SharedConnectorFactory::new(Arc::new(
            MemoryConnector::new(),
        ))));
        JobScheduler::new(JobRunner::new(store.subscribe(), Arc::new(registry)))
    }

    fn job(cron: &str) -> Job {
        Job {
            id: "j1".into(),
            name: "nightly".into(),
            cron: cron.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_stop_state_machine() {
        let s = scheduler();
        let j = job("0 0 * * *");

        s.start(&j).unwrap();
        assert!(s.is_started("j1"));
        assert!(matches!(s.start(&j), Err(JobError::AlreadyStarted(_))));

        s.stop("j1").unwrap();
        assert!(!s.is_started("j1"));
        assert!(matches!(s.stop("j1"), Err(JobError::NotStarted(_))));
    }

    #[tokio::test]
    async fn test_restart_tolerates_stopped_job() {
        let s = scheduler();
        let j = job("0 0 * * *");
        s.restart(&j).unwrap();
        assert!(s.is_started("j1"));
        s.restart(&j).unwrap();
        assert_eq!(s.started(), vec!["j1".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_cron_not_registered() {
        let s = scheduler();
        assert!(s.start(&job("not a cron")).is_err());
        assert!(!s.is_started("j1"));
    }

    #[tokio::test]
    async fn test_panicking_firing_is_recovered() {
        let handle: JoinHandle<JobResult<usize>> = tokio::spawn(async { panic!("boom") });
        let outcome = FiringOutcome::from_join(handle.await);
        assert!(matches!(outcome, FiringOutcome::Panicked(ref m) if m == "boom"));
    }
}
