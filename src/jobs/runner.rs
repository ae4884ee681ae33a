//! # Job Runner
//!
//! Executes one firing of a job. A firing owns exactly one transaction:
//! every statement of every loop iteration commits together or not at all.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use super::errors::JobResult;
use crate::master::{Job, Snapshot};
use crate::sql::{
    execute_batch, query_batch, ConnectorRegistry, PreparedScript, Replacements, SqlTransaction,
};

#[derive(Clone)]
pub struct JobRunner {
    snapshots: watch::Receiver<Snapshot>,
    connectors: Arc<ConnectorRegistry>,
}

impl JobRunner {
    pub fn new(snapshots: watch::Receiver<Snapshot>, connectors: Arc<ConnectorRegistry>) -> Self {
        Self {
            snapshots,
            connectors,
        }
    }

    /// Run the job once, returning how many times the main script ran
    pub async fn fire(&self, job: &Job) -> JobResult<usize> {
        let data = Arc::clone(&self.snapshots.borrow().data);
        let connector = self.connectors.connector(&data, &job.app_id)?;
        let mut tx = connector.begin().await?;
        match run(tx.as_mut(), job).await {
            Ok(executions) => {
                tx.commit().await?;
                Ok(executions)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(job = %job.name, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

async fn run(tx: &mut dyn SqlTransaction, job: &Job) -> JobResult<usize> {
    let no_context = Replacements::default();
    let loop_script = PreparedScript::prepare(&job.loop_script_text, &[], &no_context);
    if loop_script.is_empty() {
        let script = PreparedScript::prepare(&job.script_text, &[], &no_context);
        execute_batch(tx, &script, &[]).await?;
        return Ok(1);
    }

    let rows = query_batch(tx, &loop_script, &[]).await?;
    for row in &rows.rows {
        let values: Vec<String> = row.iter().map(cell_text).collect();
        let script = PreparedScript::prepare(&job.script_text, &values, &no_context);
        execute_batch(tx, &script, &[]).await?;
    }
    Ok(rows.rows.len())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
