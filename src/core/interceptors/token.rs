//! Token authority: checks the caller's api token on every operation,
//! decodes the session token of a logged-in user, stamps audit columns on
//! written rows and mints the session token returned by `login`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::auth::{authorize, AuthError, JwtManager, LoginUser};
use crate::core::error::{CoreError, CoreResult};
use crate::core::interceptor::{Interceptor, Invocation};
use crate::core::operation::OperationKind;
use crate::master::{App, Snapshot};
use crate::sql::{BoxFuture, StatementResult};

/// Resource whose exec result is exchanged for a session token
pub const LOGIN_RESOURCE: &str = "login";

pub struct TokenAuthority {
    snapshots: watch::Receiver<Snapshot>,
    sessions: Arc<JwtManager>,
}

impl TokenAuthority {
    pub fn new(snapshots: watch::Receiver<Snapshot>, sessions: Arc<JwtManager>) -> Self {
        Self {
            snapshots,
            sessions,
        }
    }

    fn resolve_app(&self, call: &mut Invocation<'_>) -> CoreResult<Arc<App>> {
        if let Some(app) = call.ctx.app.as_ref().filter(|a| a.id == call.ctx.app_id) {
            return Ok(Arc::clone(app));
        }
        let data = Arc::clone(&self.snapshots.borrow().data);
        let app = data
            .app(&call.ctx.app_id)
            .map(|a| Arc::new(a.clone()))
            .ok_or_else(|| CoreError::AppNotFound(call.ctx.app_id.clone()))?;
        call.ctx.app = Some(Arc::clone(&app));
        Ok(app)
    }

    /// A bad session token leaves the caller anonymous
    fn decode_user_token(&self, call: &mut Invocation<'_>) {
        let Some(token) = call.ctx.user_token.as_deref() else {
            return;
        };
        match self.sessions.verify(token) {
            Ok(claims) => call.ctx.login_user = Some(LoginUser::from_claims(&claims)),
            Err(e) => tracing::debug!(error = %e, "ignoring user token"),
        }
    }

    fn check(&self, call: &mut Invocation<'_>) -> CoreResult<()> {
        let app = self.resolve_app(call)?;
        self.decode_user_token(call);
        let token = authorize(
            &app,
            &call.ctx.api_token,
            &call.resource,
            call.kind.required_mode(),
        )?;
        call.ctx.token_user = Some(LoginUser {
            id: token.id.clone(),
            code: token.name.clone(),
        });
        if call.kind.stamps_audit() {
            stamp_audit(call);
        }
        Ok(())
    }

    fn issue_session(&self, call: &mut Invocation<'_>) -> CoreResult<()> {
        let Some(first) = call
            .results
            .as_mut()
            .and_then(|groups| groups.first_mut())
            .and_then(|group| group.first_mut())
        else {
            return Ok(());
        };
        let Some(row) = first.rows().and_then(|rows| rows.first()) else {
            return Ok(());
        };
        let token = self.sessions.sign(row.clone())?;
        *first = StatementResult::Replaced(Value::String(token));
        Ok(())
    }
}

fn stamp_row(row: &mut Map<String, Value>, kind: OperationKind, now: &str, actor: Option<&str>, ip: &str) {
    let mut set = |column: &str, value: Value| {
        row.insert(column.to_string(), value);
    };
    if kind == OperationKind::Create {
        set("CREATED_AT", Value::from(now));
        if let Some(actor) = actor {
            set("CREATED_BY", Value::from(actor));
        }
        if !ip.is_empty() {
            set("CREATED_FROM", Value::from(ip));
        }
    }
    set("UPDATED_AT", Value::from(now));
    if let Some(actor) = actor {
        set("UPDATED_BY", Value::from(actor));
    }
    if !ip.is_empty() {
        set("UPDATED_FROM", Value::from(ip));
    }
}

/// Stamp created/updated columns onto every row of the payload
fn stamp_audit(call: &mut Invocation<'_>) {
    let now = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let actor = call.ctx.audit_actor().map(str::to_string);
    let ip = call.ctx.client_ip.clone();
    let kind = call.kind;
    match &mut call.data {
        Value::Array(rows) => rows
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .for_each(|row| stamp_row(row, kind, &now, actor.as_deref(), &ip)),
        Value::Object(row) => stamp_row(row, kind, &now, actor.as_deref(), &ip),
        _ => {}
    }
}

impl Interceptor for TokenAuthority {
    fn name(&self) -> &str {
        "token_authority"
    }

    fn before<'a, 't>(&'a self, call: &'a mut Invocation<'t>) -> BoxFuture<'a, CoreResult<bool>>
    where
        't: 'a,
    {
        let outcome = self.check(call).map(|()| true);
        if let Err(CoreError::Auth(AuthError::AccessDenied)) = &outcome {
            tracing::info!(
                app = %call.ctx.app_id,
                resource = %call.resource,
                action = %call.kind,
                "access denied"
            );
        }
        Box::pin(async move { outcome })
    }

    fn after<'a, 't>(&'a self, call: &'a mut Invocation<'t>) -> BoxFuture<'a, CoreResult<()>>
    where
        't: 'a,
    {
        let outcome = if call.kind == OperationKind::Exec && call.resource == LOGIN_RESOURCE {
            self.issue_session(call)
        } else {
            Ok(())
        };
        Box::pin(async move { outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtConfig;
    use crate::core::context::RequestContext;
    use crate::master::{MasterData, MasterStore, Token};
    use crate::sql::memory::MemoryConnector;
    use serde_json::json;

    fn store() -> MasterStore {
        MasterStore::new(MasterData {
            apps: vec![App {
                id: "a1".into(),
                tokens: vec![Token {
                    id: "tok".into(),
                    name: "mobile".into(),
                    mode: "rwx".into(),
                    target: "*".into(),
                    app_id: "a1".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    fn authority(store: &MasterStore) -> TokenAuthority {
        TokenAuthority::new(
            store.subscribe(),
            Arc::new(JwtManager::new(JwtConfig::new("secret"))),
        )
    }

    #[tokio::test]
    async fn test_create_stamps_audit_columns() {
        let store = store();
        let authority = authority(&store);
        let mut ctx = RequestContext::new("a1", "tok").with_client_ip("10.1.1.1");
        let mut call = Invocation::new(
            OperationKind::Create,
            "orders",
            &mut ctx,
            Arc::new(MemoryConnector::new()),
            json!([{"item": "pen"}, {"item": "ink"}]),
        );

        assert!(authority.before(&mut call).await.unwrap());
        for row in call.data.as_array().unwrap() {
            assert!(row.get("CREATED_AT").is_some());
            assert_eq!(row["UPDATED_FROM"], json!("10.1.1.1"));
            assert!(row.get("CREATED_BY").is_none());
        }
        assert_eq!(call.ctx.token_user.as_ref().unwrap().code, "mobile");
    }

    #[tokio::test]
    async fn test_update_stamps_only_updated_columns() {
        let store = store();
        let authority = authority(&store);
        let mut ctx = RequestContext::new("a1", "tok");
        let mut call = Invocation::new(
            OperationKind::Update,
            "orders",
            &mut ctx,
            Arc::new(MemoryConnector::new()),
            json!({"item": "pen"}),
        );
        authority.before(&mut call).await.unwrap();
        assert!(call.data.get("UPDATED_AT").is_some());
        assert!(call.data.get("CREATED_AT").is_none());
    }

    #[tokio::test]
    async fn test_unknown_token_denied() {
        let store = store();
        let authority = authority(&store);
        let mut ctx = RequestContext::new("a1", "stolen");
        let mut call = Invocation::new(
            OperationKind::Load,
            "orders",
            &mut ctx,
            Arc::new(MemoryConnector::new()),
            Value::Null,
        );
        let err = authority.before(&mut call).await.unwrap_err();
        assert_eq!(err.to_string(), "Authentication failed.");
    }

    #[tokio::test]
    async fn test_valid_user_token_sets_actor() {
        let store = store();
        let sessions = JwtManager::new(JwtConfig::new("secret"));
        let mut claims = Map::new();
        claims.insert("id".into(), json!(9));
        claims.insert("email".into(), json!("u@x.io"));
        let token = sessions.sign(claims).unwrap();

        let authority = authority(&store);
        let mut ctx = RequestContext::new("a1", "tok").with_user_token(token);
        let mut call = Invocation::new(
            OperationKind::Create,
            "orders",
            &mut ctx,
            Arc::new(MemoryConnector::new()),
            json!([{}]),
        );
        authority.before(&mut call).await.unwrap();
        assert_eq!(call.data[0]["CREATED_BY"], json!("u@x.io"));
        assert_eq!(call.ctx.login_user.as_ref().unwrap().id, "9");
    }

    #[tokio::test]
    async fn test_login_result_replaced_by_token() {
        let store = store();
        let authority = authority(&store);
        let mut ctx = RequestContext::new("a1", "tok");
        let mut row = Map::new();
        row.insert("id".into(), json!(1));
        let mut call = Invocation::new(
            OperationKind::Exec,
            "login",
            &mut ctx,
            Arc::new(MemoryConnector::new()),
            Value::Null,
        );
        call.results = Some(vec![vec![StatementResult::Rows(vec![row])]]);

        authority.after(&mut call).await.unwrap();
        let results = call.results.unwrap();
        assert!(matches!(&results[0][0], StatementResult::Replaced(Value::String(t)) if t.split('.').count() == 3));
    }

    #[tokio::test]
    async fn test_qualified_login_is_not_a_login() {
        let store = store();
        let authority = authority(&store);
        let mut ctx = RequestContext::new("a1", "tok");
        let mut row = Map::new();
        row.insert("id".into(), json!(1));
        let mut call = Invocation::new(
            OperationKind::Exec,
            "`shop`.`login`",
            &mut ctx,
            Arc::new(MemoryConnector::new()),
            Value::Null,
        );
        call.results = Some(vec![vec![StatementResult::Rows(vec![row.clone()])]]);

        authority.after(&mut call).await.unwrap();
        let results = call.results.unwrap();
        assert!(matches!(&results[0][0], StatementResult::Rows(rows) if rows == &vec![row]));
    }
}
