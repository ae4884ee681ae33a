//! Interceptor Pipeline
//!
//! Two tiers of interceptors wrap every operation: global interceptors in
//! ascending priority, then interceptors registered for the requested
//! resource. After-hooks run in the reverse tier order: per-resource
//! first, then global. Lists are sorted when an interceptor is
//! registered; registering at a priority already taken replaces the
//! previous interceptor.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::error::{CoreError, CoreResult};
use super::interceptor::{Interceptor, Invocation};
use crate::auth::access::bare_resource_name;

type Ordered = Vec<(i32, Arc<dyn Interceptor>)>;

#[derive(Default)]
pub struct InterceptorRegistry {
    global: RwLock<Ordered>,
    per_resource: RwLock<HashMap<String, Ordered>>,
}

fn insert(list: &mut Ordered, priority: i32, interceptor: Arc<dyn Interceptor>) {
    match list.binary_search_by_key(&priority, |(p, _)| *p) {
        Ok(i) => list[i].1 = interceptor,
        Err(i) => list.insert(i, (priority, interceptor)),
    }
}

fn view(list: &Ordered) -> Vec<Arc<dyn Interceptor>> {
    list.iter().map(|(_, i)| Arc::clone(i)).collect()
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a global interceptor
    pub fn register_global(&self, priority: i32, interceptor: Arc<dyn Interceptor>) {
        let mut global = self.global.write().unwrap_or_else(PoisonError::into_inner);
        insert(&mut global, priority, interceptor);
    }

    /// Register an interceptor for one resource
    pub fn register(&self, resource: &str, priority: i32, interceptor: Arc<dyn Interceptor>) {
        let mut map = self
            .per_resource
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        insert(
            map.entry(bare_resource_name(resource)).or_default(),
            priority,
            interceptor,
        );
    }

    /// Global interceptors in dispatch order
    pub fn global(&self) -> Vec<Arc<dyn Interceptor>> {
        view(&self.global.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Interceptors of `resource` in dispatch order
    pub fn for_resource(&self, resource: &str) -> Vec<Arc<dyn Interceptor>> {
        self.per_resource
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&bare_resource_name(resource))
            .map(view)
            .unwrap_or_default()
    }

    /// Run every before-hook; the first halt or error aborts.
    pub async fn run_before(&self, call: &mut Invocation<'_>) -> CoreResult<()> {
        let chain = self
            .global()
            .into_iter()
            .chain(self.for_resource(&call.resource));
        for interceptor in chain {
            if !interceptor.before(call).await? {
                tracing::debug!(
                    interceptor = interceptor.name(),
                    resource = %call.resource,
                    action = %call.kind,
                    "operation halted"
                );
                return Err(CoreError::Halted(interceptor.name().to_string()));
            }
        }
        Ok(())
    }

    /// Run every after-hook; the first error aborts.
    pub async fn run_after(&self, call: &mut Invocation<'_>) -> CoreResult<()> {
        let chain = self
            .for_resource(&call.resource)
            .into_iter()
            .chain(self.global());
        for interceptor in chain {
            interceptor.after(call).await?;
        }
        Ok(())
    }
}
