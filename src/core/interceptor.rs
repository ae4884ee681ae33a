//! Interceptor Trait
//!
//! An interceptor sees every operation twice: before the primary work,
//! where returning `false` or an error aborts the call, and after it,
//! where an error still aborts and rolls back the call's transaction.

use std::sync::Arc;

use serde_json::Value;

use super::context::RequestContext;
use super::error::CoreResult;
use super::operation::OperationKind;
use crate::auth::access::bare_resource_name;
use crate::master::{App, HookDirection};
use crate::sql::{BoxFuture, ExecResults, SqlConnector, SqlTransaction};

/// One operation as seen by the interceptors
pub struct Invocation<'t> {
    pub kind: OperationKind,

    /// Resource id exactly as requested
    pub resource: String,

    pub ctx: &'t mut RequestContext,

    /// Hook payload. Before the primary work this is the operation input
    /// (rows to write, bound parameters); afterwards it also carries the
    /// results.
    pub data: Value,

    /// Exec results; after-hooks may replace entries
    pub results: Option<ExecResults>,

    /// Connector of the app, for work outside the call's transaction
    pub connector: Arc<dyn SqlConnector>,

    tx: Option<&'t mut dyn SqlTransaction>,
}

impl<'t> Invocation<'t> {
    pub fn new(
        kind: OperationKind,
        resource: impl Into<String>,
        ctx: &'t mut RequestContext,
        connector: Arc<dyn SqlConnector>,
        data: Value,
    ) -> Self {
        Self {
            kind,
            resource: resource.into(),
            ctx,
            data,
            results: None,
            connector,
            tx: None,
        }
    }

    /// Share the call's transaction with the interceptors
    pub fn with_transaction(mut self, tx: &'t mut dyn SqlTransaction) -> Self {
        self.tx = Some(tx);
        self
    }

    /// The call's open transaction, if it owns one
    pub fn transaction(&mut self) -> Option<&mut (dyn SqlTransaction + 't)> {
        self.tx.as_deref_mut()
    }

    /// Resource name without schema qualifier
    pub fn bare_resource(&self) -> String {
        bare_resource_name(&self.resource)
    }

    /// The app resolved for this call
    pub fn app(&self) -> Option<Arc<App>> {
        self.ctx.app.clone()
    }

    /// Whether an interceptor row with these settings hooks this call
    pub fn hooked_by(
        &self,
        phase: HookDirection,
        direction: HookDirection,
        target: &str,
        action_type: &str,
    ) -> bool {
        direction == phase
            && bare_resource_name(target) == self.bare_resource()
            && self.kind.matches_action(action_type)
    }
}

/// Before/After hooks around every data-plane operation
pub trait Interceptor: Send + Sync {
    /// Name used in logs and halt errors
    fn name(&self) -> &str;

    /// Runs before the primary work; `Ok(false)` halts the operation
    fn before<'a, 't>(&'a self, call: &'a mut Invocation<'t>) -> BoxFuture<'a, CoreResult<bool>>
    where
        't: 'a,
    {
        let _ = call;
        Box::pin(async { Ok(true) })
    }

    /// Runs after the primary work
    fn after<'a, 't>(&'a self, call: &'a mut Invocation<'t>) -> BoxFuture<'a, CoreResult<()>>
    where
        't: 'a,
    {
        let _ = call;
        Box::pin(async { Ok(()) })
    }
}
