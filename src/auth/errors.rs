//! # Auth Errors
//!
//! Error types for token checks, session tokens and verification mail.

use thiserror::Error;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication and authorization errors
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    // ==================
    // Access Errors
    // ==================

    /// Unknown token, resource outside the token's target, or missing mode
    #[error("Authentication failed.")]
    AccessDenied,

    /// The request names an app that does not exist
    #[error("App not found: {0}")]
    UnknownApp(String),

    // ==================
    // Session Token Errors
    // ==================

    #[error("Malformed token")]
    MalformedToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Internal error: token generation failed")]
    TokenGenerationFailed,

    // ==================
    // Mail Errors
    // ==================

    #[error("Email error: {0}")]
    EmailError(String),
}

impl AuthError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::MalformedToken => 400,
            AuthError::AccessDenied
            | AuthError::TokenExpired
            | AuthError::InvalidSignature => 401,
            AuthError::UnknownApp(_) => 404,
            AuthError::TokenGenerationFailed | AuthError::EmailError(_) => 500,
        }
    }
}
