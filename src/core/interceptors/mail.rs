//! Verification mail for `signup` and `forget_password`. The exec script of
//! those resources selects the user's email and verification code in a
//! designated statement; after the script runs, the code is mailed and the
//! statement's rows are blanked from the response.

use std::sync::Arc;

use serde_json::Value;

use crate::auth::{Mailer, VerificationKind, VerificationMail};
use crate::core::error::CoreResult;
use crate::core::interceptor::{Interceptor, Invocation};
use crate::core::operation::OperationKind;
use crate::sql::{BoxFuture, Row, StatementResult};

pub const SIGNUP_RESOURCE: &str = "signup";
pub const FORGET_PASSWORD_RESOURCE: &str = "forget_password";

pub struct MailInterceptor {
    kind: VerificationKind,
    /// Statement of the first group whose rows carry the code
    statement: usize,
    mailer: Arc<dyn Mailer>,
}

impl MailInterceptor {
    pub fn signup(mailer: Arc<dyn Mailer>) -> Self {
        Self {
            kind: VerificationKind::Signup,
            statement: 5,
            mailer,
        }
    }

    pub fn forget_password(mailer: Arc<dyn Mailer>) -> Self {
        Self {
            kind: VerificationKind::PasswordReset,
            statement: 3,
            mailer,
        }
    }

    /// Resource this interceptor is registered for
    pub fn resource(&self) -> &'static str {
        match self.kind {
            VerificationKind::Signup => SIGNUP_RESOURCE,
            VerificationKind::PasswordReset => FORGET_PASSWORD_RESOURCE,
        }
    }

    /// Take the verification mail out of the results, blanking the statement
    fn extract(&self, call: &mut Invocation<'_>) -> Option<VerificationMail> {
        let slot = call
            .results
            .as_mut()?
            .first_mut()?
            .get_mut(self.statement)?;
        let mail = slot
            .rows()
            .and_then(|rows| rows.first())
            .and_then(|row| self.mail_for(row));
        *slot = StatementResult::Replaced(Value::String(String::new()));
        mail
    }

    fn mail_for(&self, row: &Row) -> Option<VerificationMail> {
        let field = |name: &str| {
            row.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .and_then(|(_, v)| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
        };
        Some(VerificationMail {
            kind: self.kind,
            to: field("EMAIL")?,
            code: field("VERIFICATION_CODE")?,
        })
    }
}

impl Interceptor for MailInterceptor {
    fn name(&self) -> &str {
        self.resource()
    }

    fn after<'a, 't>(&'a self, call: &'a mut Invocation<'t>) -> BoxFuture<'a, CoreResult<()>>
    where
        't: 'a,
    {
        let mail = if call.kind == OperationKind::Exec {
            self.extract(call)
        } else {
            None
        };
        Box::pin(async move {
            if let Some(mail) = mail {
                // delivery problems do not undo the signup
                if let Err(e) = self.mailer.send(&mail).await {
                    tracing::warn!(to = %mail.to, error = %e, "verification mail failed");
                }
            }
            Ok(())
        })
    }
}
