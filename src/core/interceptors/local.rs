//! Local dispatcher: runs the callback query of every matching local
//! interceptor row. Callbacks share the call's transaction, so they
//! commit or roll back together with the operation that triggered them.

use std::sync::Arc;

use serde_json::Value;

use super::{param_groups, select_payload};
use crate::core::criteria::CriteriaEvaluator;
use crate::core::error::{CoreError, CoreResult};
use crate::core::interceptor::{Interceptor, Invocation};
use crate::master::{HookDirection, LocalInterceptor};
use crate::sql::{execute_batch, execute_in_transaction, BoxFuture, PreparedScript};

pub struct LocalDispatcher {
    criteria: Arc<dyn CriteriaEvaluator>,
}

impl LocalDispatcher {
    pub fn new(criteria: Arc<dyn CriteriaEvaluator>) -> Self {
        Self { criteria }
    }

    async fn dispatch(&self, call: &mut Invocation<'_>, phase: HookDirection) -> CoreResult<()> {
        let Some(app) = call.app() else {
            return Ok(());
        };
        let rows: Vec<&LocalInterceptor> = app
            .local_interceptors
            .iter()
            .filter(|li| li.app_id == app.id)
            .filter(|li| call.hooked_by(phase, li.direction, &li.target, &li.action_type))
            .collect();

        for li in rows {
            let Some(payload) = select_payload(self.criteria.as_ref(), &li.criteria, &call.data)?
            else {
                tracing::debug!(interceptor = %li.name, "criteria not met");
                continue;
            };
            let query = app
                .query(&li.callback)
                .ok_or_else(|| CoreError::QueryNotFound(li.callback.clone()))?;
            run_callback(call, &query.script_text, &payload).await?;
        }
        Ok(())
    }
}

/// Run a callback script inside the call's transaction, or in its own
/// when the call has none.
pub(crate) async fn run_callback(
    call: &mut Invocation<'_>,
    script_text: &str,
    payload: &Value,
) -> CoreResult<()> {
    let script = PreparedScript::prepare(script_text, &[], &call.ctx.replacements());
    let groups = param_groups(payload);
    match call.transaction() {
        Some(tx) => execute_batch(tx, &script, &groups).await?,
        None => execute_in_transaction(call.connector.as_ref(), &script, &groups).await?,
    };
    Ok(())
}

impl Interceptor for LocalDispatcher {
    fn name(&self) -> &str {
        "local_interceptors"
    }

    fn before<'a, 't>(&'a self, call: &'a mut Invocation<'t>) -> BoxFuture<'a, CoreResult<bool>>
    where
        't: 'a,
    {
        Box::pin(async move {
            self.dispatch(call, HookDirection::Before).await?;
            Ok(true)
        })
    }

    fn after<'a, 't>(&'a self, call: &'a mut Invocation<'t>) -> BoxFuture<'a, CoreResult<()>>
    where
        't: 'a,
    {
        Box::pin(self.dispatch(call, HookDirection::After))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::RequestContext;
    use crate::core::criteria::FieldCriteria;
    use crate::core::operation::OperationKind;
    use crate::master::{App, Query};
    use crate::sql::memory::MemoryConnector;
    use crate::sql::SqlConnector;
    use serde_json::json;

    fn app(criteria: &str) -> App {
        App {
            id: "a1".into(),
            queries: vec![Query {
                name: "audit".into(),
                script_text: "INSERT INTO audit VALUES (?)".into(),
                app_id: "a1".into(),
                ..Default::default()
            }],
            local_interceptors: vec![LocalInterceptor {
                name: "audit_orders".into(),
                app_id: "a1".into(),
                target: "orders".into(),
                direction: HookDirection::Before,
                action_type: "exec".into(),
                criteria: criteria.into(),
                callback: "audit".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn context(app: App) -> RequestContext {
        let mut ctx = RequestContext::new("a1", "tok");
        ctx.app = Some(Arc::new(app));
        ctx
    }

    #[tokio::test]
    async fn test_callback_runs_in_caller_transaction() {
        let db = MemoryConnector::new();
        let dispatcher = LocalDispatcher::new(Arc::new(FieldCriteria));
        let mut ctx = context(app(""));
        let mut tx = db.begin().await.unwrap();
        {
            let mut call = Invocation::new(
                OperationKind::Exec,
                "orders",
                &mut ctx,
                Arc::new(db.clone()),
                json!({"params": [[1], [2]]}),
            )
            .with_transaction(tx.as_mut());
            assert!(dispatcher.before(&mut call).await.unwrap());
        }
        // nothing visible until the caller commits
        assert!(db.table("audit").is_empty());
        tx.commit().await.unwrap();
        assert_eq!(db.table("audit").len(), 2);
    }

    #[tokio::test]
    async fn test_unmatched_criteria_skips_row() {
        let db = MemoryConnector::new();
        let dispatcher = LocalDispatcher::new(Arc::new(FieldCriteria));
        let mut ctx = context(app("total > 100"));
        let mut call = Invocation::new(
            OperationKind::Exec,
            "orders",
            &mut ctx,
            Arc::new(db.clone()),
            json!([{"total": 5}]),
        );
        assert!(dispatcher.before(&mut call).await.unwrap());
        assert_eq!(db.transactions_begun(), 0);
    }

    #[tokio::test]
    async fn test_other_phase_and_action_ignored() {
        let db = MemoryConnector::new();
        let dispatcher = LocalDispatcher::new(Arc::new(FieldCriteria));
        let mut ctx = context(app(""));
        let mut call = Invocation::new(
            OperationKind::QueryMap,
            "orders",
            &mut ctx,
            Arc::new(db.clone()),
            json!({"params": [1]}),
        );
        dispatcher.before(&mut call).await.unwrap();
        dispatcher.after(&mut call).await.unwrap();
        assert!(db.table("audit").is_empty());
    }

    #[tokio::test]
    async fn test_missing_callback_query_fails() {
        let db = MemoryConnector::new();
        let dispatcher = LocalDispatcher::new(Arc::new(FieldCriteria));
        let mut broken = app("");
        broken.queries.clear();
        let mut ctx = context(broken);
        let mut call = Invocation::new(
            OperationKind::Exec,
            "orders",
            &mut ctx,
            Arc::new(db.clone()),
            json!({"params": [[1]]}),
        );
        let err = dispatcher.before(&mut call).await.unwrap_err();
        assert_eq!(err.to_string(), "Query not found: audit");
    }
}
