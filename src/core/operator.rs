//! Data Operator
//!
//! The three data-plane entry points. Each call resolves the app and the
//! named query, checks the bound parameter count, opens one transaction,
//! and runs the interceptor pipeline around the script. The transaction
//! commits only if every before-hook, the script and every after-hook
//! succeed.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::watch;

use super::context::RequestContext;
use super::error::{CoreError, CoreResult};
use super::interceptor::Invocation;
use super::operation::OperationKind;
use super::pipeline::InterceptorRegistry;
use crate::master::{App, Snapshot};
use crate::sql::{
    check_groups, execute_batch, query_batch, ConnectorRegistry, ExecResults, PreparedScript, Row,
    RowSet, SqlConnector, SqlTransaction,
};

pub struct DataOperator {
    snapshots: watch::Receiver<Snapshot>,
    connectors: Arc<ConnectorRegistry>,
    interceptors: Arc<InterceptorRegistry>,
}

/// What one call needs before its transaction opens
struct Target {
    connector: Arc<dyn SqlConnector>,
    script: String,
}

impl DataOperator {
    pub fn new(
        snapshots: watch::Receiver<Snapshot>,
        connectors: Arc<ConnectorRegistry>,
        interceptors: Arc<InterceptorRegistry>,
    ) -> Self {
        Self {
            snapshots,
            connectors,
            interceptors,
        }
    }

    pub fn interceptors(&self) -> &Arc<InterceptorRegistry> {
        &self.interceptors
    }

    /// Run a query script, returning keyed rows
    pub async fn query_map(
        &self,
        resource: &str,
        params: Vec<Value>,
        text_params: Vec<String>,
        ctx: &mut RequestContext,
    ) -> CoreResult<Vec<Row>> {
        let rows = self
            .query(OperationKind::QueryMap, resource, params, text_params, ctx)
            .await?;
        Ok(rows.to_maps())
    }

    /// Run a query script, returning headers and positional rows
    pub async fn query_array(
        &self,
        resource: &str,
        params: Vec<Value>,
        text_params: Vec<String>,
        ctx: &mut RequestContext,
    ) -> CoreResult<RowSet> {
        self.query(OperationKind::QueryArray, resource, params, text_params, ctx)
            .await
    }

    /// Run an exec script once per parameter group
    pub async fn exec(
        &self,
        resource: &str,
        groups: Vec<Vec<Value>>,
        text_params: Vec<String>,
        ctx: &mut RequestContext,
    ) -> CoreResult<ExecResults> {
        let target = self.resolve(resource, ctx)?;
        let script = PreparedScript::prepare(&target.script, &text_params, &ctx.replacements());
        check_groups(&script, &groups)?;

        let mut tx = target.connector.begin().await?;
        let outcome = self
            .exec_in(tx.as_mut(), &target, resource, groups, text_params, ctx)
            .await;
        finish(tx, outcome, resource).await
    }

    async fn query(
        &self,
        kind: OperationKind,
        resource: &str,
        params: Vec<Value>,
        text_params: Vec<String>,
        ctx: &mut RequestContext,
    ) -> CoreResult<RowSet> {
        let target = self.resolve(resource, ctx)?;
        let script = PreparedScript::prepare(&target.script, &text_params, &ctx.replacements());
        script.check_params(params.len())?;

        let mut tx = target.connector.begin().await?;
        let outcome = self
            .query_in(tx.as_mut(), kind, &target, resource, params, text_params, ctx)
            .await;
        finish(tx, outcome, resource).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn query_in(
        &self,
        tx: &mut dyn SqlTransaction,
        kind: OperationKind,
        target: &Target,
        resource: &str,
        params: Vec<Value>,
        text_params: Vec<String>,
        ctx: &mut RequestContext,
    ) -> CoreResult<RowSet> {
        let data = json!({ "params": params, "query_params": text_params });
        let mut call = Invocation::new(kind, resource, ctx, Arc::clone(&target.connector), data)
            .with_transaction(tx);
        self.interceptors.run_before(&mut call).await?;

        // hooks may have resolved the login user, so prepare again
        let script =
            PreparedScript::prepare(&target.script, &text_params, &call.ctx.replacements());
        let rows = match call.transaction() {
            Some(tx) => query_batch(tx, &script, &params).await?,
            None => RowSet::default(),
        };

        call.data = match kind {
            OperationKind::QueryArray => json!({ "headers": rows.headers, "data": rows.rows }),
            _ => serde_json::to_value(rows.to_maps())?,
        };
        self.interceptors.run_after(&mut call).await?;
        Ok(rows)
    }

    async fn exec_in(
        &self,
        tx: &mut dyn SqlTransaction,
        target: &Target,
        resource: &str,
        groups: Vec<Vec<Value>>,
        text_params: Vec<String>,
        ctx: &mut RequestContext,
    ) -> CoreResult<ExecResults> {
        let data = json!({ "params": groups, "query_params": text_params });
        let mut call = Invocation::new(
            OperationKind::Exec,
            resource,
            ctx,
            Arc::clone(&target.connector),
            data,
        )
        .with_transaction(tx);
        self.interceptors.run_before(&mut call).await?;

        let script =
            PreparedScript::prepare(&target.script, &text_params, &call.ctx.replacements());
        let results = match call.transaction() {
            Some(tx) => execute_batch(tx, &script, &groups).await?,
            None => ExecResults::new(),
        };

        call.data["rows_affected"] = serde_json::to_value(&results)?;
        call.results = Some(results);
        self.interceptors.run_after(&mut call).await?;
        Ok(call.results.take().unwrap_or_default())
    }

    /// Resolve the app (cached in the context) and the query script
    fn resolve(&self, resource: &str, ctx: &mut RequestContext) -> CoreResult<Target> {
        let data = Arc::clone(&self.snapshots.borrow().data);
        let app = match &ctx.app {
            Some(app) if app.id == ctx.app_id => Arc::clone(app),
            _ => {
                let app = data
                    .app(&ctx.app_id)
                    .ok_or_else(|| CoreError::AppNotFound(ctx.app_id.clone()))?;
                Arc::new(app.clone())
            }
        };
        ctx.app = Some(Arc::clone(&app));

        let script = query_script(&app, resource)?;
        let connector = self.connectors.connector(&data, &app.id)?;
        Ok(Target { connector, script })
    }
}

fn query_script(app: &App, resource: &str) -> CoreResult<String> {
    app.query(resource)
        .map(|q| q.script_text.clone())
        .ok_or_else(|| CoreError::QueryNotFound(resource.to_string()))
}

async fn finish<T>(
    tx: Box<dyn SqlTransaction>,
    outcome: CoreResult<T>,
    resource: &str,
) -> CoreResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(resource, error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}
