//! Replication Subsystem
//!
//! The master is the only node that executes configuration commands.
//! Slaves register over a websocket, receive the full configuration as
//! their baseline and then every new version; CLI commands sent to a
//! slave are relayed to the master.
//!
//! - Secrets are checked before a slave is recorded
//! - Pushes never block master mutations
//! - A dropped slave reconnects after a fixed delay, indefinitely

mod command;
mod control;
mod errors;
mod forward;
mod hub;
mod registry;
mod role;
mod slave;

pub use command::{ControlCommand, Envelope, SlaveHello, META_APP_ID, WS_MASTER_DATA, WS_REGISTER};
pub use control::ControlPlane;
pub use errors::{ReplicationError, ReplicationErrorKind, ReplicationResult};
pub use forward::{ControlClient, CONTROL_PATH};
pub use hub::{MasterHub, HANDSHAKE_TIMEOUT, REGISTER_OK, REGISTER_REJECTED};
pub use registry::SlaveRegistry;
pub use role::NodeRole;
pub use slave::{LinkStatus, SlaveLink, DEFAULT_RECONNECT_DELAY};
