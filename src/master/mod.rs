//! # Master Data
//!
//! The versioned configuration aggregate shared by every node, the store
//! that serializes its mutations, and the side effects that accompany them
//! (script resolution, tenant provisioning, job lifecycle).

mod errors;
pub mod listing;
mod model;
pub mod provision;
mod store;

pub use errors::{MasterError, MasterResult};
pub use listing::{ListKind, ListMode};
pub use model::{
    ApiNode, App, DataNode, DataNodePatch, EntityRef, HookDirection, Job, LocalInterceptor,
    MasterData, Query, QueryPatch, RemoteInterceptor, Token,
};
pub use provision::{MySqlProvisioner, NoopProvisioner, TenantProvisioner};
pub use store::{MasterStore, Snapshot};
