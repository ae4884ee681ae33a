//! Remote dispatcher: posts `{target, action, data}` to the URL of every
//! matching remote interceptor row. A non-200 answer fails the hook. When
//! the row names a callback query, the response body is replayed through
//! it: inside the call's transaction before the primary work, in a
//! transaction of its own afterwards.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::local::run_callback;
use super::{param_groups, select_payload};
use crate::core::criteria::CriteriaEvaluator;
use crate::core::error::{CoreError, CoreResult};
use crate::core::interceptor::{Interceptor, Invocation};
use crate::master::{HookDirection, RemoteInterceptor};
use crate::sql::{execute_in_transaction, BoxFuture, PreparedScript};

/// Default bound on one remote call
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Status and body of a remote answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReply {
    pub status: u16,
    pub body: String,
}

/// Outbound HTTP
pub trait RemoteTransport: Send + Sync {
    fn send<'a>(
        &'a self,
        method: &'a str,
        url: &'a str,
        body: String,
    ) -> BoxFuture<'a, CoreResult<RemoteReply>>;
}

/// reqwest-backed transport with a per-request timeout
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    async fn call(&self, method: &str, url: &str, body: String) -> CoreResult<RemoteReply> {
        let method = if method.trim().is_empty() {
            reqwest::Method::POST
        } else {
            reqwest::Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
                .map_err(|e| CoreError::Transport(e.to_string()))?
        };
        let response = self
            .client
            .request(method, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))?;
        Ok(RemoteReply { status, body })
    }
}

impl RemoteTransport for HttpTransport {
    fn send<'a>(
        &'a self,
        method: &'a str,
        url: &'a str,
        body: String,
    ) -> BoxFuture<'a, CoreResult<RemoteReply>> {
        Box::pin(self.call(method, url, body))
    }
}

pub struct RemoteDispatcher {
    transport: Arc<dyn RemoteTransport>,
    criteria: Arc<dyn CriteriaEvaluator>,
}

impl RemoteDispatcher {
    pub fn new(transport: Arc<dyn RemoteTransport>, criteria: Arc<dyn CriteriaEvaluator>) -> Self {
        Self {
            transport,
            criteria,
        }
    }

    async fn dispatch(&self, call: &mut Invocation<'_>, phase: HookDirection) -> CoreResult<()> {
        let Some(app) = call.app() else {
            return Ok(());
        };
        let rows: Vec<&RemoteInterceptor> = app
            .remote_interceptors
            .iter()
            .filter(|ri| ri.app_id == app.id)
            .filter(|ri| call.hooked_by(phase, ri.direction, &ri.target, &ri.action_type))
            .collect();

        for ri in rows {
            let Some(data) = select_payload(self.criteria.as_ref(), &ri.criteria, &call.data)?
            else {
                tracing::debug!(interceptor = %ri.name, "criteria not met");
                continue;
            };
            let payload = json!({
                "target": call.bare_resource(),
                "action": format!("{}_{}", phase.as_str(), call.kind.action()),
                "data": data,
            });
            let reply = self
                .transport
                .send(&ri.method, &ri.url, payload.to_string())
                .await
                .map_err(|e| {
                    tracing::warn!(interceptor = %ri.name, url = %ri.url, error = %e, "remote interceptor unreachable");
                    e
                })?;
            if reply.status != 200 {
                tracing::warn!(
                    interceptor = %ri.name,
                    url = %ri.url,
                    status = reply.status,
                    "remote interceptor rejected"
                );
                return Err(CoreError::RemoteRejected {
                    url: ri.url.clone(),
                    status: reply.status,
                });
            }

            if ri.callback.trim().is_empty() {
                continue;
            }
            let query = app
                .query(&ri.callback)
                .ok_or_else(|| CoreError::QueryNotFound(ri.callback.clone()))?;
            let replay: Value = serde_json::from_str(&reply.body)?;
            match phase {
                HookDirection::Before => run_callback(call, &query.script_text, &replay).await?,
                HookDirection::After => {
                    let script =
                        PreparedScript::prepare(&query.script_text, &[], &call.ctx.replacements());
                    execute_in_transaction(
                        call.connector.as_ref(),
                        &script,
                        &param_groups(&replay),
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }
}

impl Interceptor for RemoteDispatcher {
    fn name(&self) -> &str {
        "remote_interceptors"
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
