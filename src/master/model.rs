//! # Configuration Model
//!
//! Entities held by the master configuration. Field names serialize in
//! PascalCase, which is the wire format shared by the CLI, the control
//! endpoint, the slave channel and the persisted data file.

use serde::{Deserialize, Serialize};

/// A physical database server hosting tenant databases
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DataNode {
    pub id: String,
    pub name: String,
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// Engine type, e.g. `mysql`
    #[serde(rename = "Type")]
    pub engine: String,
    pub note: String,
    pub status: String,
}

/// Partial update for a data node; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DataNodePatch {
    pub id: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub note: Option<String>,
    pub status: Option<String>,
}

/// A tenant application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct App {
    pub id: String,
    pub name: String,
    pub db_name: String,
    pub data_node_id: String,
    pub note: String,
    pub status: String,
    pub queries: Vec<Query>,
    pub jobs: Vec<Job>,
    pub tokens: Vec<Token>,
    pub local_interceptors: Vec<LocalInterceptor>,
    pub remote_interceptors: Vec<RemoteInterceptor>,
}

impl App {
    /// Find a query by name
    pub fn query(&self, name: &str) -> Option<&Query> {
        self.queries.iter().find(|q| q.name == name)
    }

    /// Find a token by its id (the token string presented by callers)
    pub fn token(&self, id: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.id == id && t.app_id == self.id)
    }

    /// Find a job by id
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }
}

/// A named SQL batch owned by an app
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Query {
    pub id: String,
    pub name: String,
    pub script_path: String,
    pub script_text: String,
    pub app_id: String,
    pub note: String,
    pub status: String,
}

/// Partial update for a query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QueryPatch {
    pub id: String,
    pub app_id: String,
    pub name: Option<String>,
    pub script_path: Option<String>,
    pub script_text: Option<String>,
    pub note: Option<String>,
    pub status: Option<String>,
}

/// A cron-scheduled SQL batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub cron: String,
    pub script_path: String,
    pub script_text: String,
    pub auto_start: bool,
    pub loop_script_path: String,
    pub loop_script_text: String,
    pub app_id: String,
    pub note: String,
    pub status: String,
}

/// Access grant for an app's resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Token {
    pub id: String,
    pub name: String,
    /// Permitted operation letters, e.g. `rwx`
    pub mode: String,
    /// Comma separated resource names or `*`
    pub target: String,
    pub app_id: String,
    pub note: String,
    pub status: String,
}

/// Which side of an operation an interceptor row hooks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookDirection {
    #[default]
    Before,
    After,
}

impl HookDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookDirection::Before => "before",
            HookDirection::After => "after",
        }
    }
}

/// Tenant rule whose callback is a named query run in-process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LocalInterceptor {
    pub id: String,
    pub name: String,
    pub app_id: String,
    pub target: String,
    #[serde(rename = "Type")]
    pub direction: HookDirection,
    /// Operation action (`create`, `exec`, ...); empty or `*` matches all
    pub action_type: String,
    pub criteria: String,
    pub callback: String,
    pub note: String,
    pub status: String,
}

/// Tenant rule whose callback is an outbound HTTP call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RemoteInterceptor {
    pub id: String,
    pub name: String,
    pub app_id: String,
    pub target: String,
    pub method: String,
    pub url: String,
    #[serde(rename = "Type")]
    pub direction: HookDirection,
    pub action_type: String,
    pub criteria: String,
    /// Optional query replaying the response body as rows
    pub callback: String,
    pub note: String,
    pub status: String,
}

/// A currently connected slave
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiNode {
    pub id: String,
    /// Remote address of the slave connection
    pub name: String,
    pub note: String,
    pub status: String,
}

/// Reference to an app-owned entity, used by remove commands
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EntityRef {
    pub id: String,
    pub app_id: String,
}

/// The root aggregate: one versioned snapshot of the whole configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MasterData {
    pub version: i64,
    pub data_nodes: Vec<DataNode>,
    pub apps: Vec<App>,
    /// Connected slaves; ephemeral, never part of a persisted snapshot
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub api_nodes: Vec<ApiNode>,
}

impl MasterData {
    pub fn data_node(&self, id: &str) -> Option<&DataNode> {
        self.data_nodes.iter().find(|d| d.id == id)
    }

    pub fn app(&self, id: &str) -> Option<&App> {
        self.apps.iter().find(|a| a.id == id)
    }

    pub(crate) fn app_mut(&mut self, id: &str) -> Option<&mut App> {
        self.apps.iter_mut().find(|a| a.id == id)
    }

    /// Iterate every job together with its owning app
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.apps.iter().flat_map(|a| a.jobs.iter())
    }
}
