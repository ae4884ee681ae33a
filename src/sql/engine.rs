//! # Batch Execution
//!
//! Runs prepared scripts inside a caller-supplied transaction. Exec
//! batches run once per parameter group; each statement consumes exactly
//! as many values from the group as it has `?` placeholders.

use serde_json::Value;

use super::backend::{RowSet, SqlConnector, SqlTransaction, StatementResult};
use super::errors::{SqlError, SqlResult};
use super::script::PreparedScript;

/// Results of an exec batch: one entry per group, one result per statement
pub type ExecResults = Vec<Vec<StatementResult>>;

/// Validate every group before any statement runs
pub fn check_groups(script: &PreparedScript, groups: &[Vec<Value>]) -> SqlResult<()> {
    if groups.is_empty() {
        return script.check_params(0);
    }
    groups.iter().try_for_each(|g| script.check_params(g.len()))
}

/// Run `script` once per parameter group.
///
/// With no groups the batch runs once without parameters.
pub async fn execute_batch(
    tx: &mut dyn SqlTransaction,
    script: &PreparedScript,
    groups: &[Vec<Value>],
) -> SqlResult<ExecResults> {
    check_groups(script, groups)?;
    if groups.is_empty() {
        return Ok(vec![run_group(tx, script, &[]).await?]);
    }
    let mut results = Vec::with_capacity(groups.len());
    for group in groups {
        results.push(run_group(tx, script, group).await?);
    }
    Ok(results)
}

async fn run_group(
    tx: &mut dyn SqlTransaction,
    script: &PreparedScript,
    group: &[Value],
) -> SqlResult<Vec<StatementResult>> {
    let mut offset = 0;
    let mut results = Vec::with_capacity(script.statements.len());
    for stmt in &script.statements {
        let params = slice_params(group, offset, stmt.placeholders)?;
        offset += stmt.placeholders;
        let result = if stmt.is_row_returning() {
            StatementResult::Rows(tx.query(&stmt.sql, params).await?.to_maps())
        } else {
            StatementResult::RowsAffected(tx.execute(&stmt.sql, params).await?)
        };
        results.push(result);
    }
    Ok(results)
}

/// Run every statement of a query script with a single flat parameter list,
/// returning the rows of the last row-returning statement.
pub async fn query_batch(
    tx: &mut dyn SqlTransaction,
    script: &PreparedScript,
    params: &[Value],
) -> SqlResult<RowSet> {
    script.check_params(params.len())?;
    let mut offset = 0;
    let mut last = RowSet::default();
    for stmt in &script.statements {
        let slice = slice_params(params, offset, stmt.placeholders)?;
        offset += stmt.placeholders;
        if stmt.is_row_returning() {
            last = tx.query(&stmt.sql, slice).await?;
        } else {
            tx.execute(&stmt.sql, slice).await?;
        }
    }
    Ok(last)
}

fn slice_params(params: &[Value], offset: usize, count: usize) -> SqlResult<&[Value]> {
    params
        .get(offset..offset + count)
        .ok_or(SqlError::ParamCount {
            expected: offset + count,
            actual: params.len(),
        })
}

/// Run an exec batch in its own transaction, committing on success
pub async fn execute_in_transaction(
    connector: &dyn SqlConnector,
    script: &PreparedScript,
    groups: &[Vec<Value>],
) -> SqlResult<ExecResults> {
    check_groups(script, groups)?;
    let mut tx = connector.begin().await?;
    match execute_batch(tx.as_mut(), script, groups).await {
        Ok(results) => {
            tx.commit().await?;
            Ok(results)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::memory::MemoryConnector;
    use crate::sql::script::Replacements;
    use serde_json::json;

    fn prepare(text: &str) -> PreparedScript {
        PreparedScript::prepare(text, &[], &Replacements::default())
    }

    #[tokio::test]
    async fn test_groups_consume_params_per_statement() {
        let db = MemoryConnector::new();
        let script = prepare("INSERT INTO a VALUES (?, ?); INSERT INTO b VALUES (?)");
        let groups = vec![
            vec![json!(1), json!("x"), json!(true)],
            vec![json!(2), json!("y"), json!(false)],
        ];
        let results = execute_in_transaction(&db, &script, &groups).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], vec![StatementResult::RowsAffected(1); 2]);
        assert_eq!(db.table("a").len(), 2);
        assert_eq!(db.table("b")[1], vec![json!(false)]);
    }

    #[tokio::test]
    async fn test_no_groups_runs_once() {
        let db = MemoryConnector::new();
        let script = prepare("INSERT INTO a VALUES (1)");
        let results = execute_in_transaction(&db, &script, &[]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(db.table("a").len(), 1);
    }

    #[tokio::test]
    async fn test_short_group_rejected_before_begin() {
        let db = MemoryConnector::new();
        let script = prepare("INSERT INTO a VALUES (?, ?)");
        let err = execute_in_transaction(&db, &script, &[vec![json!(1)]])
            .await
            .unwrap_err();
        assert!(matches!(err, SqlError::ParamCount { expected: 2, actual: 1 }));
        assert_eq!(db.transactions_begun(), 0);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_whole_batch() {
        let db = MemoryConnector::new();
        let script = prepare(
            "INSERT INTO a VALUES (1); SIGNAL SQLSTATE '45000'; INSERT INTO a VALUES (2)",
        );
        assert!(execute_in_transaction(&db, &script, &[]).await.is_err());
        assert!(db.table("a").is_empty());
        assert_eq!(db.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_query_batch_returns_last_rows() {
        let db = MemoryConnector::new();
        db.seed("users", &["id", "name"], vec![vec![json!(1), json!("ann")]]);
        let script = prepare("INSERT INTO log VALUES (?); SELECT * FROM users");
        let mut tx = db.begin().await.unwrap();
        let rows = query_batch(tx.as_mut(), &script, &[json!("x")]).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(rows.headers, vec!["id", "name"]);
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(db.table("log").len(), 1);
    }
}
