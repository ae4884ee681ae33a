//! Operation Kinds
//!
//! Every data-plane call is one of these kinds. The kind decides the mode
//! letters a token needs and the action name interceptor rows match on.

use serde::{Deserialize, Serialize};

use crate::auth::{MODE_EXEC, MODE_READ, MODE_WRITE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Load,
    Update,
    Duplicate,
    Delete,
    ListMap,
    ListArray,
    QueryMap,
    QueryArray,
    Exec,
}

impl OperationKind {
    /// Action name, e.g. `query_map`
    pub fn action(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Load => "load",
            Self::Update => "update",
            Self::Duplicate => "duplicate",
            Self::Delete => "delete",
            Self::ListMap => "list_map",
            Self::ListArray => "list_array",
            Self::QueryMap => "query_map",
            Self::QueryArray => "query_array",
            Self::Exec => "exec",
        }
    }

    /// Hook family: `list` and `query` cover both their map and array forms
    pub fn family(&self) -> &'static str {
        match self {
            Self::ListMap | Self::ListArray => "list",
            Self::QueryMap | Self::QueryArray => "query",
            other => other.action(),
        }
    }

    /// Mode letters a token must grant
    pub fn required_mode(&self) -> &'static str {
        match self {
            Self::Create | Self::Update | Self::Duplicate | Self::Delete => MODE_WRITE,
            Self::Load | Self::ListMap | Self::ListArray | Self::QueryMap | Self::QueryArray => {
                MODE_READ
            }
            Self::Exec => MODE_EXEC,
        }
    }

    /// Whether the rows of the payload get audit columns stamped
    pub fn stamps_audit(&self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }

    /// Whether an interceptor row's action type selects this kind.
    /// Empty and `*` select everything.
    pub fn matches_action(&self, action_type: &str) -> bool {
        let action_type = action_type.trim();
        action_type.is_empty()
            || action_type == "*"
            || action_type == self.action()
            || action_type == self.family()
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.action())
    }
}
