//! Request Context
//!
//! Context carried through the interceptor pipeline for one data-plane
//! call: who is calling, from where, and what earlier interceptors have
//! already resolved.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::auth::LoginUser;
use crate::master::App;
use crate::sql::Replacements;

/// Context carried through the interceptor pipeline
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request ID for tracing
    pub request_id: Uuid,

    /// App the request is addressed to
    pub app_id: String,

    /// Token presented by the caller; matched against the app's tokens
    pub api_token: String,

    /// Session token of a logged-in user, if any
    pub user_token: Option<String>,

    pub client_ip: String,

    /// The app, resolved once and reused by later interceptors
    pub app: Option<Arc<App>>,

    /// Set when `user_token` verified
    pub login_user: Option<LoginUser>,

    /// The token that authorized the call
    pub token_user: Option<LoginUser>,

    /// Start time for duration tracking
    started_at: Instant,
}

impl RequestContext {
    pub fn new(app_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            app_id: app_id.into(),
            api_token: api_token.into(),
            user_token: None,
            client_ip: String::new(),
            app: None,
            login_user: None,
            token_user: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_user_token(mut self, token: impl Into<String>) -> Self {
        self.user_token = Some(token.into());
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = ip.into();
        self
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }

    /// Identity written to the `*_BY` audit columns
    pub fn audit_actor(&self) -> Option<&str> {
        self.login_user
            .as_ref()
            .map(|u| u.code.as_str())
            .filter(|code| !code.is_empty())
    }

    /// Context tokens substituted into scripts
    pub fn replacements(&self) -> Replacements {
        let token_user = self.token_user.clone().unwrap_or_default();
        let login_user = self.login_user.clone().unwrap_or_default();
        Replacements {
            client_ip: self.client_ip.clone(),
            token_user_id: token_user.id,
            token_user_code: token_user.code,
            login_user_id: login_user.id,
            login_user_code: login_user.code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replacements_from_context() {
        let mut ctx = RequestContext::new("a1", "tok").with_client_ip("10.0.0.7");
        ctx.login_user = Some(LoginUser {
            id: "42".into(),
            code: "x@y.z".into(),
        });

        let r = ctx.replacements();
        assert_eq!(r.client_ip, "10.0.0.7");
        assert_eq!(r.login_user_id, "42");
        assert!(r.token_user_id.is_empty());
        assert_eq!(ctx.audit_actor(), Some("x@y.z"));
    }

    #[test]
    fn test_anonymous_has_no_actor() {
        assert_eq!(RequestContext::new("a1", "tok").audit_actor(), None);
    }
}
