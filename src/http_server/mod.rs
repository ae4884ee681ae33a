//! # HTTP Server Module
//!
//! Every node serves the same listener:
//!
//! # Endpoints
//!
//! - `/sys/cli` - CLI control envelopes
//! - `/sys/ws` - slave channel (master only)
//! - `/sys/shutdown` - local shutdown
//! - `/api/:resource` - tenant data operations

pub mod config;
pub mod control_routes;
pub mod data_routes;
pub mod server;

pub use config::{HttpServerConfig, DEFAULT_PORT};
pub use server::{HttpServer, NodeState};
