//! netgate - multi-tenant SQL gateway
//!
//! Tenants call named SQL batches over HTTP; a master node owns the
//! configuration and pushes every version to its slaves.

pub mod auth;
pub mod cli;
pub mod core;
pub mod http_server;
pub mod jobs;
pub mod master;
pub mod observability;
pub mod replication;
pub mod sql;
