//! # Control Plane
//!
//! Executes CLI envelopes. The master decodes and applies them to its
//! store; a slave relays them verbatim to its master and returns the
//! master's answer. Either way the answer is plain text: empty on
//! success, a listing, or the error message.

use std::sync::Arc;

use super::command::{ControlCommand, Envelope};
use super::errors::{ReplicationError, ReplicationResult};
use super::forward::ControlClient;
use super::registry::SlaveRegistry;
use crate::master::{listing, MasterStore};

enum Role {
    Master { slaves: Arc<SlaveRegistry> },
    Slave { upstream: ControlClient },
}

pub struct ControlPlane {
    store: Arc<MasterStore>,
    role: Role,
}

impl ControlPlane {
    pub fn master(store: Arc<MasterStore>, slaves: Arc<SlaveRegistry>) -> Self {
        Self {
            store,
            role: Role::Master { slaves },
        }
    }

    pub fn slave(store: Arc<MasterStore>, upstream: ControlClient) -> Self {
        Self {
            store,
            role: Role::Slave { upstream },
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self.role, Role::Master { .. })
    }

    /// Answer an envelope; errors become their message text
    pub async fn handle(&self, envelope: Envelope) -> String {
        let tag = envelope.tag.clone();
        let outcome = match &self.role {
            Role::Slave { upstream } => {
                tracing::debug!(command = %tag, master = %upstream.url(), "relaying command");
                upstream.send(&envelope).await
            }
            Role::Master { .. } => match ControlCommand::decode(&envelope) {
                Ok(command) => self.execute(command).await,
                Err(e) => Err(e),
            },
        };
        match outcome {
            Ok(text) => text,
            Err(e) => {
                tracing::info!(command = %tag, error = %e, "command failed");
                e.to_string()
            }
        }
    }

    /// Apply a decoded command to the master store
    pub async fn execute(&self, command: ControlCommand) -> ReplicationResult<String> {
        use ControlCommand::*;

        let Role::Master { slaves } = &self.role else {
            return Err(ReplicationError::unsupported(command.tag()));
        };
        let store = &self.store;
        let tag = command.tag();
        match command {
            List { kind, mode, app_id } => return Ok(store.list(kind, mode, app_id.as_deref())),
            ListApiNodes(mode) => return Ok(listing::list_api_nodes(&slaves.api_nodes(), mode)),
            ShowMaster => return Ok(store.show(slaves.api_nodes())?),

            AddDataNode(node) => store.add_data_node(node).await?,
            UpdateDataNode(patch) => store.update_data_node(patch).await?,
            RemoveDataNode(id) => store.remove_data_node(&id).await?,

            AddApp(app) => store.add_app(app).await?,
            UpdateApp(app) => store.update_app(app).await?,
            RemoveApp(id) => store.remove_app(&id).await?,

            AddQuery(query) => store.add_query(query).await?,
            UpdateQuery(patch) => store.update_query(patch).await?,
            RemoveQuery(target) => store.remove_query(&target).await?,

            AddJob(job) => store.add_job(job).await?,
            UpdateJob(job) => store.update_job(job).await?,
            RemoveJob(target) => store.remove_job(&target).await?,
            StartJob(target) => store.start_job(&target)?,
            StopJob(target) => store.stop_job(&target)?,
            RestartJob(target) => store.restart_job(&target)?,

            AddToken(token) => store.add_token(token).await?,
            UpdateToken(token) => store.update_token(token).await?,
            RemoveToken(target) => store.remove_token(&target).await?,

            AddLocalInterceptor(li) => store.add_local_interceptor(li).await?,
            UpdateLocalInterceptor(li) => store.update_local_interceptor(li).await?,
            RemoveLocalInterceptor(target) => store.remove_local_interceptor(&target).await?,

            AddRemoteInterceptor(ri) => store.add_remote_interceptor(ri).await?,
            UpdateRemoteInterceptor(ri) => store.update_remote_interceptor(ri).await?,
            RemoveRemoteInterceptor(target) => store.remove_remote_interceptor(&target).await?,

            // channel messages have no meaning on the control endpoint
            Register(_) | MasterSnapshot(_) => return Err(ReplicationError::unsupported(tag)),
        }
        tracing::info!(command = tag, version = store.current().version, "command applied");
        Ok(String::new())
    }
}
