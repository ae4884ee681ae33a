//! # Control Commands
//!
//! Every message on the control endpoint and on the slave channel is an
//! [`Envelope`] `{Type, Data, Meta}`. The `Type` tag is decoded exactly
//! once into a [`ControlCommand`]; a tag outside the vocabulary is an
//! error, never a silent no-op.
//!
//! Conventions for `Data`:
//!
//! - `*_LIST`: the listing mode (`compact`, `full`, anything else)
//! - `*_ADD` / `*_UPDATE`: the entity as JSON
//! - `CLI_DN_REMOVE` / `CLI_APP_REMOVE`: the bare id
//! - other removes and job controls: `{Id, AppId}` as JSON
//!
//! App-owned listings may be scoped with `Meta.AppId`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::{ReplicationError, ReplicationResult};
use crate::master::{
    App, DataNode, DataNodePatch, EntityRef, Job, ListKind, ListMode, LocalInterceptor,
    MasterData, Query, QueryPatch, RemoteInterceptor, Token,
};

pub const WS_REGISTER: &str = "WS_REGISTER";
pub const WS_MASTER_DATA: &str = "WS_MASTER_DATA";

/// Meta key scoping app-owned listings
pub const META_APP_ID: &str = "AppId";

/// Wire envelope shared by the CLI and the slave channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Envelope {
    #[serde(rename = "Type")]
    pub tag: String,
    pub data: String,
    pub meta: Map<String, Value>,
}

impl Envelope {
    pub fn new(tag: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            data: data.into(),
            meta: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    pub fn to_json(&self) -> ReplicationResult<String> {
        serde_json::to_string(self).map_err(|e| ReplicationError::decode(&self.tag, e))
    }

    pub fn from_json(text: &str) -> ReplicationResult<Self> {
        serde_json::from_str(text).map_err(|e| ReplicationError::decode("envelope", e))
    }
}

/// Registration sent by a slave right after dialing the master
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SlaveHello {
    pub id: String,
    pub secret: String,
}

impl std::fmt::Debug for SlaveHello {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlaveHello")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The closed command vocabulary
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    List {
        kind: ListKind,
        mode: ListMode,
        app_id: Option<String>,
    },
    ListApiNodes(ListMode),
    ShowMaster,

    AddDataNode(DataNode),
    UpdateDataNode(DataNodePatch),
    RemoveDataNode(String),

    AddApp(App),
    UpdateApp(App),
    RemoveApp(String),

    AddQuery(Query),
    UpdateQuery(QueryPatch),
    RemoveQuery(EntityRef),

    AddJob(Job),
    UpdateJob(Job),
    RemoveJob(EntityRef),
    StartJob(EntityRef),
    StopJob(EntityRef),
    RestartJob(EntityRef),

    AddToken(Token),
    UpdateToken(Token),
    RemoveToken(EntityRef),

    AddLocalInterceptor(LocalInterceptor),
    UpdateLocalInterceptor(LocalInterceptor),
    RemoveLocalInterceptor(EntityRef),

    AddRemoteInterceptor(RemoteInterceptor),
    UpdateRemoteInterceptor(RemoteInterceptor),
    RemoveRemoteInterceptor(EntityRef),

    /// Slave to master
    Register(SlaveHello),
    /// Master to slave
    MasterSnapshot(MasterData),
}

fn payload<T: DeserializeOwned>(envelope: &Envelope) -> ReplicationResult<T> {
    serde_json::from_str(&envelope.data).map_err(|e| ReplicationError::decode(&envelope.tag, e))
}

fn encode_data<T: Serialize>(tag: &str, value: &T) -> ReplicationResult<String> {
    serde_json::to_string(value).map_err(|e| ReplicationError::decode(tag, e))
}

fn list_tag(kind: ListKind) -> &'static str {
    match kind {
        ListKind::DataNodes => "CLI_DN_LIST",
        ListKind::Apps => "CLI_APP_LIST",
        ListKind::Queries => "CLI_QUERY_LIST",
        ListKind::Jobs => "CLI_JOB_LIST",
        ListKind::Tokens => "CLI_TOKEN_LIST",
        ListKind::LocalInterceptors => "CLI_LI_LIST",
        ListKind::RemoteInterceptors => "CLI_RI_LIST",
    }
}

impl ControlCommand {
    /// Decode an envelope into a command
    pub fn decode(envelope: &Envelope) -> ReplicationResult<Self> {
        use ControlCommand::*;

        let list = |kind| List {
            kind,
            mode: ListMode::parse(&envelope.data),
            app_id: envelope
                .meta
                .get(META_APP_ID)
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        };

        let command = match envelope.tag.as_str() {
            "CLI_DN_LIST" => list(ListKind::DataNodes),
            "CLI_DN_ADD" => AddDataNode(payload(envelope)?),
            "CLI_DN_UPDATE" => UpdateDataNode(payload(envelope)?),
            "CLI_DN_REMOVE" => RemoveDataNode(envelope.data.trim().to_string()),

            "CLI_APP_LIST" => list(ListKind::Apps),
            "CLI_APP_ADD" => AddApp(payload(envelope)?),
            "CLI_APP_UPDATE" => UpdateApp(payload(envelope)?),
            "CLI_APP_REMOVE" => RemoveApp(envelope.data.trim().to_string()),

            "CLI_QUERY_LIST" => list(ListKind::Queries),
            "CLI_QUERY_ADD" => AddQuery(payload(envelope)?),
            "CLI_QUERY_UPDATE" => UpdateQuery(payload(envelope)?),
            "CLI_QUERY_REMOVE" => RemoveQuery(payload(envelope)?),

            "CLI_JOB_LIST" => list(ListKind::Jobs),
            "CLI_JOB_ADD" => AddJob(payload(envelope)?),
            "CLI_JOB_UPDATE" => UpdateJob(payload(envelope)?),
            "CLI_JOB_REMOVE" => RemoveJob(payload(envelope)?),
            "CLI_JOB_START" => StartJob(payload(envelope)?),
            "CLI_JOB_STOP" => StopJob(payload(envelope)?),
            "CLI_JOB_RESTART" => RestartJob(payload(envelope)?),

            "CLI_TOKEN_LIST" => list(ListKind::Tokens),
            "CLI_TOKEN_ADD" => AddToken(payload(envelope)?),
            "CLI_TOKEN_UPDATE" => UpdateToken(payload(envelope)?),
            "CLI_TOKEN_REMOVE" => RemoveToken(payload(envelope)?),

            "CLI_LI_LIST" => list(ListKind::LocalInterceptors),
            "CLI_LI_ADD" => AddLocalInterceptor(payload(envelope)?),
            "CLI_LI_UPDATE" => UpdateLocalInterceptor(payload(envelope)?),
            "CLI_LI_REMOVE" => RemoveLocalInterceptor(payload(envelope)?),

            "CLI_RI_LIST" => list(ListKind::RemoteInterceptors),
            "CLI_RI_ADD" => AddRemoteInterceptor(payload(envelope)?),
            "CLI_RI_UPDATE" => UpdateRemoteInterceptor(payload(envelope)?),
            "CLI_RI_REMOVE" => RemoveRemoteInterceptor(payload(envelope)?),

            "CLI_AN_LIST" => ListApiNodes(ListMode::parse(&envelope.data)),
            "CLI_SHOW_MASTER" => ShowMaster,

            WS_REGISTER => Register(payload(envelope)?),
            WS_MASTER_DATA => MasterSnapshot(payload(envelope)?),

            other => return Err(ReplicationError::unknown_command(other)),
        };
        Ok(command)
    }

    /// Wire tag of this command
    pub fn tag(&self) -> &'static str {
        use ControlCommand::*;
        match self {
            List { kind, .. } => list_tag(*kind),
            ListApiNodes(_) => "CLI_AN_LIST",
            ShowMaster => "CLI_SHOW_MASTER",
            AddDataNode(_) => "CLI_DN_ADD",
            UpdateDataNode(_) => "CLI_DN_UPDATE",
            RemoveDataNode(_) => "CLI_DN_REMOVE",
            AddApp(_) => "CLI_APP_ADD",
            UpdateApp(_) => "CLI_APP_UPDATE",
            RemoveApp(_) => "CLI_APP_REMOVE",
            AddQuery(_) => "CLI_QUERY_ADD",
            UpdateQuery(_) => "CLI_QUERY_UPDATE",
            RemoveQuery(_) => "CLI_QUERY_REMOVE",
            AddJob(_) => "CLI_JOB_ADD",
            UpdateJob(_) => "CLI_JOB_UPDATE",
            RemoveJob(_) => "CLI_JOB_REMOVE",
            StartJob(_) => "CLI_JOB_START",
            StopJob(_) => "CLI_JOB_STOP",
            RestartJob(_) => "CLI_JOB_RESTART",
            AddToken(_) => "CLI_TOKEN_ADD",
            UpdateToken(_) => "CLI_TOKEN_UPDATE",
            RemoveToken(_) => "CLI_TOKEN_REMOVE",
            AddLocalInterceptor(_) => "CLI_LI_ADD",
            UpdateLocalInterceptor(_) => "CLI_LI_UPDATE",
            RemoveLocalInterceptor(_) => "CLI_LI_REMOVE",
            AddRemoteInterceptor(_) => "CLI_RI_ADD",
            UpdateRemoteInterceptor(_) => "CLI_RI_UPDATE",
            RemoveRemoteInterceptor(_) => "CLI_RI_REMOVE",
            Register(_) => WS_REGISTER,
            MasterSnapshot(_) => WS_MASTER_DATA,
        }
    }

    /// Encode into the envelope the CLI sends
    pub fn encode(&self) -> ReplicationResult<Envelope> {
        use ControlCommand::*;

        let tag = self.tag();
        let envelope = match self {
            List { mode, app_id, .. } => {
                let envelope = Envelope::new(tag, mode.as_str());
                match app_id {
                    Some(id) => envelope.with_meta(META_APP_ID, id.as_str()),
                    None => envelope,
                }
            }
            ListApiNodes(mode) => Envelope::new(tag, mode.as_str()),
            ShowMaster => Envelope::new(tag, ""),
            RemoveDataNode(id) | RemoveApp(id) => Envelope::new(tag, id.as_str()),
            AddDataNode(v) => Envelope::new(tag, encode_data(tag, v)?),
            UpdateDataNode(v) => Envelope::new(tag, encode_data(tag, v)?),
            AddApp(v) | UpdateApp(v) => Envelope::new(tag, encode_data(tag, v)?),
            AddQuery(v) => Envelope::new(tag, encode_data(tag, v)?),
            UpdateQuery(v) => Envelope::new(tag, encode_data(tag, v)?),
            AddJob(v) | UpdateJob(v) => Envelope::new(tag, encode_data(tag, v)?),
            AddToken(v) | UpdateToken(v) => Envelope::new(tag, encode_data(tag, v)?),
            AddLocalInterceptor(v) | UpdateLocalInterceptor(v) => {
                Envelope::new(tag, encode_data(tag, v)?)
            }
            AddRemoteInterceptor(v) | UpdateRemoteInterceptor(v) => {
                Envelope::new(tag, encode_data(tag, v)?)
            }
            RemoveQuery(r) | RemoveJob(r) | StartJob(r) | StopJob(r) | RestartJob(r)
            | RemoveToken(r) | RemoveLocalInterceptor(r) | RemoveRemoteInterceptor(r) => {
                Envelope::new(tag, encode_data(tag, r)?)
            }
            Register(hello) => Envelope::new(tag, encode_data(tag, hello)?),
            MasterSnapshot(data) => Envelope::new(tag, encode_data(tag, data)?),
        };
        Ok(envelope)
    }
}
