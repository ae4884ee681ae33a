//! # Verification Mail
//!
//! Delivery of signup and password-reset verification codes.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::auth::errors::{AuthError, AuthResult};
use crate::sql::BoxFuture;

/// SMTP settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// SMTP server host
    pub smtp_host: String,

    /// SMTP server port
    pub smtp_port: u16,

    /// SMTP username; empty disables authentication
    pub smtp_user: String,

    pub smtp_password: String,

    /// From email address
    pub from_email: String,

    /// From name
    pub from_name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "localhost".to_string(),
            smtp_port: 25,
            smtp_user: String::new(),
            smtp_password: String::new(),
            from_email: "noreply@netgate.local".to_string(),
            from_name: "Netgate".to_string(),
        }
    }
}

/// Which flow a verification code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationKind {
    Signup,
    PasswordReset,
}

/// A verification code addressed to a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMail {
    pub kind: VerificationKind,
    pub to: String,
    pub code: String,
}

impl VerificationMail {
    /// Subject and plain text body
    pub fn render(&self) -> (String, String) {
        match self.kind {
            VerificationKind::Signup => (
                "Verify your email address".to_string(),
                format!(
                    "Hello,\n\nYour verification code is: {}\n\n\
                     If you didn't create an account, you can ignore this email.\n",
                    self.code
                ),
            ),
            VerificationKind::PasswordReset => (
                "Reset your password".to_string(),
                format!(
                    "Hello,\n\nUse this code to reset your password: {}\n\n\
                     If you didn't request this, you can ignore this email.\n",
                    self.code
                ),
            ),
        }
    }
}

/// Mail delivery
pub trait Mailer: Send + Sync {
    fn send<'a>(&'a self, mail: &'a VerificationMail) -> BoxFuture<'a, AuthResult<()>>;
}

/// Records mail instead of sending it
#[derive(Debug, Default)]
pub struct MockMailer {
    sent: Mutex<Vec<VerificationMail>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<VerificationMail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Mailer for MockMailer {
    fn send<'a>(&'a self, mail: &'a VerificationMail) -> BoxFuture<'a, AuthResult<()>> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mail.clone());
        Box::pin(async { Ok(()) })
    }
}

/// Logs the mail at info level; used when no SMTP server is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send<'a>(&'a self, mail: &'a VerificationMail) -> BoxFuture<'a, AuthResult<()>> {
        let (subject, _) = mail.render();
        tracing::info!(to = %mail.to, subject = %subject, "verification mail not sent, no smtp configured");
        Box::pin(async { Ok(()) })
    }
}

/// SMTP delivery over lettre's async transport
pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn build(&self, mail: &VerificationMail) -> AuthResult<lettre::Message> {
        use lettre::message::header::ContentType;

        let (subject, body) = mail.render();
        lettre::Message::builder()
            .from(
                format!("{} <{}>", self.config.from_name, self.config.from_email)
                    .parse()
                    .map_err(|e| AuthError::EmailError(format!("Invalid from address: {}", e)))?,
            )
            .to(mail
                .to
                .parse()
                .map_err(|e| AuthError::EmailError(format!("Invalid to address: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AuthError::EmailError(format!("Failed to build email: {}", e)))
    }

    async fn deliver(&self, mail: &VerificationMail) -> AuthResult<()> {
        use lettre::{
            transport::smtp::authentication::Credentials, AsyncSmtpTransport, AsyncTransport,
            Tokio1Executor,
        };

        let email = self.build(mail)?;

        let transport = if self.config.smtp_user.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.smtp_host)
                .port(self.config.smtp_port)
                .build()
        } else {
            let creds = Credentials::new(
                self.config.smtp_user.clone(),
                self.config.smtp_password.clone(),
            );
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
                .map_err(|e| AuthError::EmailError(format!("SMTP relay error: {}", e)))?
                .credentials(creds)
                .port(self.config.smtp_port)
                .build()
        };

        transport
            .send(email)
            .await
            .map_err(|e| AuthError::EmailError(format!("Failed to send email: {}", e)))?;
        Ok(())
    }
}

impl Mailer for SmtpMailer {
    fn send<'a>(&'a self, mail: &'a VerificationMail) -> BoxFuture<'a, AuthResult<()>> {
        Box::pin(self.deliver(mail))
    }
}

/// SMTP when configured, otherwise log-only
pub fn create_mailer(config: Option<MailConfig>) -> Arc<dyn Mailer> {
    match config {
        Some(cfg) => Arc::new(SmtpMailer::new(cfg)),
        None => Arc::new(LogMailer),
    }
}
