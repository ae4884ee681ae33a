//! # Master Data Errors

use thiserror::Error;

/// Result type for configuration mutations
pub type MasterResult<T> = Result<T, MasterError>;

/// Errors raised by the configuration store.
///
/// The display text is what the control endpoint returns to the CLI.
#[derive(Debug, Error)]
pub enum MasterError {
    // ==================
    // Validation Errors
    // ==================
    #[error("{kind} existed: {name}")]
    Duplicate { kind: &'static str, name: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} does not exist: {id}")]
    DanglingReference { kind: &'static str, id: String },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    // ==================
    // Side Effect Errors
    // ==================
    #[error("{0}")]
    Script(String),

    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("{0}")]
    Job(String),

    // ==================
    // Persistence Errors
    // ==================
    #[error("Failed to persist master data: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode master data: {0}")]
    Encode(#[from] serde_json::Error),
}

impl MasterError {
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Duplicate {
            kind,
            name: name.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn dangling(kind: &'static str, id: impl Into<String>) -> Self {
        Self::DanglingReference {
            kind,
            id: id.into(),
        }
    }

    /// Whether the mutation was rejected before any state change
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Duplicate { .. }
                | Self::NotFound { .. }
                | Self::DanglingReference { .. }
                | Self::Invalid { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_cli_output() {
        assert_eq!(
            MasterError::duplicate("Data node", "d1").to_string(),
            "Data node existed: d1"
        );
        assert_eq!(
            MasterError::dangling("App", "a9").to_string(),
            "App does not exist: a9"
        );
        assert!(MasterError::not_found("Query", "q").is_validation());
    }
}
