//! Replication Error Types
//!
//! Errors of the control channel: decoding envelopes, the slave handshake,
//! forwarding CLI commands and the master socket itself.

use thiserror::Error;

use crate::master::MasterError;

/// Result type for replication operations
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Replication error type
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ReplicationError {
    /// Error kind
    pub kind: ReplicationErrorKind,
    /// Error message, returned verbatim to the CLI
    pub message: String,
}

/// Replication error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationErrorKind {
    /// Envelope type is not part of the command vocabulary
    UnknownCommand,

    /// Envelope data could not be decoded for its type
    Decode,

    /// Command is valid but not accepted on this endpoint
    Unsupported,

    /// The master refused the slave's secret
    SecretRejected,

    /// Handshake did not follow the register/OK exchange
    Handshake,

    /// Network failure on the channel or while forwarding
    Transport,

    /// The configuration store rejected the command
    Master,
}

impl ReplicationError {
    /// Create a new replication error.
    pub fn new(kind: ReplicationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_command(tag: &str) -> Self {
        Self::new(
            ReplicationErrorKind::UnknownCommand,
            format!("Unknown command: {}", tag),
        )
    }

    pub fn decode(tag: &str, reason: impl std::fmt::Display) -> Self {
        Self::new(
            ReplicationErrorKind::Decode,
            format!("Invalid data for {}: {}", tag, reason),
        )
    }

    pub fn unsupported(tag: &str) -> Self {
        Self::new(
            ReplicationErrorKind::Unsupported,
            format!("Command not accepted here: {}", tag),
        )
    }

    pub fn secret_rejected(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::SecretRejected, message)
    }

    pub fn handshake(message: impl Into<String>) -> Self {
        Self::new(ReplicationErrorKind::Handshake, message)
    }

    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::new(ReplicationErrorKind::Transport, message.to_string())
    }

    pub fn kind(&self) -> ReplicationErrorKind {
        self.kind
    }
}

impl From<MasterError> for ReplicationError {
    fn from(e: MasterError) -> Self {
        Self::new(ReplicationErrorKind::Master, e.to_string())
    }
}
