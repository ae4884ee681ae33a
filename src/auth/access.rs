//! # Token Access Checks
//!
//! A token grants access when the requested resource is in its target set
//! and every letter of the requested operation code is in its mode.

use super::errors::{AuthError, AuthResult};
use crate::master::{App, Token};

/// Read access
pub const MODE_READ: &str = "r";
/// Write access
pub const MODE_WRITE: &str = "w";
/// Script execution
pub const MODE_EXEC: &str = "rx";

/// Resource name without schema qualifier or backticks
pub fn bare_resource_name(resource: &str) -> String {
    let unquoted = resource.replace('`', "");
    unquoted
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Whether `target` (`*` or a comma list) covers `resource`
pub fn target_matches(target: &str, resource: &str) -> bool {
    if target.trim() == "*" {
        return true;
    }
    let name = bare_resource_name(resource);
    target.split(',').any(|t| t.trim() == name)
}

/// Whether every letter of `op` is granted by `mode`
pub fn mode_allows(mode: &str, op: &str) -> bool {
    op.chars().all(|c| mode.contains(c))
}

pub fn check_access(target: &str, mode: &str, resource: &str, op: &str) -> bool {
    target_matches(target, resource) && mode_allows(mode, op)
}

/// Find the app's token `token_id` and check it against `resource` and `op`
pub fn authorize<'a>(app: &'a App, token_id: &str, resource: &str, op: &str) -> AuthResult<&'a Token> {
    let token = app.token(token_id).ok_or(AuthError::AccessDenied)?;
    if check_access(&token.target, &token.mode, resource, op) {
        Ok(token)
    } else {
        Err(AuthError::AccessDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_letters() {
        assert!(!mode_allows("r", "w"));
        assert!(mode_allows("rw", "r"));
        assert!(mode_allows("rw", "w"));
        assert!(mode_allows("rw", "rw"));
        assert!(!mode_allows("w", MODE_EXEC));
        assert!(mode_allows("rwx", MODE_EXEC));
    }

    #[test]
    fn test_star_matches_qualified_names() {
        assert!(target_matches("*", "`shop`.`orders`"));
        assert!(target_matches("*", "anything"));
    }

    #[test]
    fn test_target_list_is_exact() {
        assert!(target_matches("orders,users", "orders"));
        assert!(target_matches("orders,users", "shop.users"));
        assert!(!target_matches("orders,users", "order"));
        assert!(!target_matches("orders,users", "invoices"));
    }

    #[test]
    fn test_authorize_requires_token_of_app() {
        let app = App {
            id: "a1".into(),
            tokens: vec![Token {
                id: "tok".into(),
                mode: "r".into(),
                target: "orders".into(),
                app_id: "a1".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(authorize(&app, "tok", "orders", MODE_READ).is_ok());
        assert!(authorize(&app, "tok", "orders", MODE_WRITE).is_err());
        assert!(authorize(&app, "other", "orders", MODE_READ).is_err());
    }
}
