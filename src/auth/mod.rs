//! # Auth
//!
//! Token access checks, session tokens for logged-in users, and delivery
//! of verification mail.

pub mod access;
pub mod email;
pub mod errors;
pub mod jwt;

pub use access::{authorize, check_access, MODE_EXEC, MODE_READ, MODE_WRITE};
pub use email::{
    create_mailer, LogMailer, MailConfig, Mailer, MockMailer, SmtpMailer, VerificationKind,
    VerificationMail,
};
pub use errors::{AuthError, AuthResult};
pub use jwt::{JwtConfig, JwtManager, LoginUser, SESSION_TTL_HOURS};
