//! CLI-specific error types
//!
//! A CLI error ends the process with a non-zero exit code. Errors answered
//! by a node are not CLI errors: their text is printed like any answer.

use std::io;

use thiserror::Error;

use crate::master::MasterError;
use crate::replication::ReplicationError;

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error
    IoError,
    /// Could not reach the node
    TransportError,
    /// Node failed to start
    BootFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "NETGATE_CLI_CONFIG_ERROR",
            Self::IoError => "NETGATE_CLI_IO_ERROR",
            Self::TransportError => "NETGATE_CLI_TRANSPORT_ERROR",
            Self::BootFailed => "NETGATE_CLI_BOOT_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug, Error)]
#[error("{}: {message}", .code.code())]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn transport_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::TransportError, msg)
    }

    /// Boot failed
    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    /// Get the error code
    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ReplicationError> for CliError {
    fn from(e: ReplicationError) -> Self {
        Self::transport_error(e.to_string())
    }
}

impl From<MasterError> for CliError {
    fn from(e: MasterError) -> Self {
        Self::boot_failed(e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err = CliError::config_error("port must be > 0");
        assert_eq!(
            err.to_string(),
            "NETGATE_CLI_CONFIG_ERROR: port must be > 0"
        );
        assert_eq!(err.code(), CliErrorCode::ConfigError);
    }
}
