//! # Tenant SQL
//!
//! Script preparation and transactional batch execution against tenant
//! databases.

pub mod backend;
mod engine;
mod errors;
pub mod loader;
pub mod memory;
pub mod mysql;
pub mod registry;
pub mod script;

pub use backend::{BoxFuture, Row, RowSet, SqlConnector, SqlTransaction, StatementResult};
pub use engine::{check_groups, execute_batch, execute_in_transaction, query_batch, ExecResults};
pub use errors::{SqlError, SqlResult};
pub use loader::{ResolvedScript, ScriptLocator};
pub use registry::{ConnectorFactory, ConnectorRegistry, SharedConnectorFactory};
pub use script::{PreparedScript, Replacements};
