//! # Data Plane Core
//!
//! Every tenant data operation runs through [`DataOperator`], which wraps
//! the SQL engine in the interceptor pipeline.
//!
//! ## Design Principles
//!
//! - One transaction per call, shared with local interceptor callbacks
//! - Global interceptors first, in ascending priority, then per-resource
//! - Interceptor rows are data, evaluated on every call

pub mod context;
pub mod criteria;
pub mod error;
pub mod interceptor;
pub mod interceptors;
pub mod operation;
pub mod operator;
pub mod pipeline;

use std::sync::Arc;

use tokio::sync::watch;

pub use context::RequestContext;
pub use criteria::{CriteriaEvaluator, FieldCriteria};
pub use error::{CoreError, CoreResult};
pub use interceptor::{Interceptor, Invocation};
pub use operation::OperationKind;
pub use operator::DataOperator;
pub use pipeline::InterceptorRegistry;

use crate::auth::{JwtManager, Mailer};
use crate::master::Snapshot;
use interceptors::{
    LocalDispatcher, MailInterceptor, RemoteDispatcher, RemoteTransport, TokenAuthority,
    LOCAL_DISPATCHER_PRIORITY, REMOTE_DISPATCHER_PRIORITY, TOKEN_AUTHORITY_PRIORITY,
};

/// Collaborators of the built-in interceptors
pub struct Builtins {
    pub snapshots: watch::Receiver<Snapshot>,
    pub sessions: Arc<JwtManager>,
    pub transport: Arc<dyn RemoteTransport>,
    pub criteria: Arc<dyn CriteriaEvaluator>,
    pub mailer: Arc<dyn Mailer>,
}

impl InterceptorRegistry {
    /// Registry with the token authority, both dispatchers and the
    /// verification mail interceptors installed
    pub fn with_builtins(builtins: Builtins) -> Self {
        let registry = Self::new();
        registry.register_global(
            TOKEN_AUTHORITY_PRIORITY,
            Arc::new(TokenAuthority::new(builtins.snapshots, builtins.sessions)),
        );
        registry.register_global(
            LOCAL_DISPATCHER_PRIORITY,
            Arc::new(LocalDispatcher::new(Arc::clone(&builtins.criteria))),
        );
        registry.register_global(
            REMOTE_DISPATCHER_PRIORITY,
            Arc::new(RemoteDispatcher::new(builtins.transport, builtins.criteria)),
        );
        for mail in [
            MailInterceptor::signup(Arc::clone(&builtins.mailer)),
            MailInterceptor::forget_password(builtins.mailer),
        ] {
            registry.register(mail.resource(), 0, Arc::new(mail));
        }
        registry
    }
}
