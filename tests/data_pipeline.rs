//! Data Pipeline Tests
//!
//! End-to-end calls through the data operator with the built-in
//! interceptors installed, against the in-memory transactional store:
//! - login results become signed session tokens
//! - a failing before-hook rolls back its own side effects
//! - a halting interceptor stops the call before the script runs
//! - criteria decide whether a local interceptor row fires
//! - a failing statement undoes the whole batch

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};

use netgate::auth::{JwtConfig, JwtManager, MockMailer, SESSION_TTL_HOURS};
use netgate::core::interceptors::HttpTransport;
use netgate::core::{
    Builtins, CoreError, CoreResult, DataOperator, FieldCriteria, Interceptor,
    InterceptorRegistry, Invocation, RequestContext,
};
use netgate::master::{
    App, DataNode, HookDirection, LocalInterceptor, MasterData, MasterStore, Query, Token,
};
use netgate::sql::memory::MemoryConnector;
use netgate::sql::{BoxFuture, ConnectorRegistry, SharedConnectorFactory, StatementResult};

const SECRET: &str = "pipeline-secret";

fn query(name: &str, script: &str) -> Query {
    Query {
        id: name.into(),
        name: name.into(),
        script_text: script.into(),
        app_id: "a1".into(),
        ..Default::default()
    }
}

fn hook(name: &str, target: &str, direction: HookDirection, criteria: &str, callback: &str) -> LocalInterceptor {
    LocalInterceptor {
        id: name.into(),
        name: name.into(),
        app_id: "a1".into(),
        target: target.into(),
        direction,
        criteria: criteria.into(),
        callback: callback.into(),
        ..Default::default()
    }
}

fn store(queries: Vec<Query>, local_interceptors: Vec<LocalInterceptor>) -> MasterStore {
    MasterStore::new(MasterData {
        data_nodes: vec![DataNode {
            id: "n1".into(),
            name: "d1".into(),
            ..Default::default()
        }],
        apps: vec![App {
            id: "a1".into(),
            name: "shop".into(),
            data_node_id: "n1".into(),
            queries,
            local_interceptors,
            tokens: vec![Token {
                id: "tok".into(),
                name: "web".into(),
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

fn operator(store: &MasterStore, db: &MemoryConnector) -> DataOperator {
    let connectors = ConnectorRegistry::new(Arc::new(SharedConnectorFactory::new(Arc::new(
        db.clone(),
    ))));
    let interceptors = InterceptorRegistry::with_builtins(Builtins {
        snapshots: store.subscribe(),
        sessions: Arc::new(JwtManager::new(JwtConfig::new(SECRET))),
        transport: Arc::new(HttpTransport::new(Duration::from_secs(1)).unwrap()),
        criteria: Arc::new(FieldCriteria),
        mailer: Arc::new(MockMailer::new()),
    });
    DataOperator::new(store.subscribe(), Arc::new(connectors), Arc::new(interceptors))
}

fn context() -> RequestContext {
    RequestContext::new("a1", "tok").with_client_ip("127.0.0.1")
}

// =============================================================================
// Login
// =============================================================================

/// A login row is replaced by a token expiring about 72 hours from now.
#[tokio::test]
async fn test_login_returns_session_token() {
    let db = MemoryConnector::new();
    let store = store(
        vec![query("login", "SELECT 7 AS id, 'u@x.io' AS email")],
        vec![],
    );
    let op = operator(&store, &db);

    let results = op.exec("login", vec![], vec![], &mut context()).await.unwrap();
    let token = match &results[0][0] {
        StatementResult::Replaced(Value::String(token)) => token.clone(),
        other => panic!("expected a token, got {:?}", other),
    };

    let claims = JwtManager::new(JwtConfig::new(SECRET)).verify(&token).unwrap();
    assert_eq!(claims["email"], json!("u@x.io"));
    let exp = claims["exp"].as_i64().unwrap();
    let expected = Utc::now().timestamp() + SESSION_TTL_HOURS * 3600;
    assert!((exp - expected).abs() < 60, "exp {} vs {}", exp, expected);
}

// =============================================================================
// Before-hook aborts
// =============================================================================

/// A failing before callback aborts the exec and its own insert is undone.
#[tokio::test]
async fn test_failing_before_hook_rolls_back() {
    let db = MemoryConnector::new();
    db.seed("items", &["name", "price"], vec![]);
    let store = store(
        vec![
            query("add_item", "INSERT INTO items VALUES (?, ?)"),
            query(
                "guard",
                "INSERT INTO audit VALUES (?, ?); SIGNAL SQLSTATE '45000'",
            ),
        ],
        vec![hook("guard_items", "add_item", HookDirection::Before, "", "guard")],
    );
    let op = operator(&store, &db);

    let err = op
        .exec("add_item", vec![vec![json!("pen"), json!(5)]], vec![], &mut context())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unhandled user-defined exception"));
    assert!(db.table("items").is_empty());
    assert!(db.table("audit").is_empty());
    assert_eq!(db.rollbacks(), 1);
    assert_eq!(db.commits(), 0);
}

struct Gate;

impl Interceptor for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    fn before<'a, 't>(&'a self, _call: &'a mut Invocation<'t>) -> BoxFuture<'a, CoreResult<bool>>
    where
        't: 'a,
    {
        Box::pin(async { Ok(false) })
    }
}

/// `Ok(false)` from a before-hook halts the call; the script never runs.
#[tokio::test]
async fn test_halting_interceptor_stops_exec() {
    let db = MemoryConnector::new();
    let store = store(vec![query("add_item", "INSERT INTO items VALUES (?)")], vec![]);
    let op = operator(&store, &db);
    op.interceptors().register("add_item", 50, Arc::new(Gate));

    let err = op
        .exec("add_item", vec![vec![json!("pen")]], vec![], &mut context())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Halted(ref name) if name == "gate"));
    assert!(db.table("items").is_empty());
    assert_eq!(db.rollbacks(), 1);
}

// =============================================================================
// Criteria
// =============================================================================

fn audited_reads(criteria: &str) -> MasterStore {
    store(
        vec![
            query("items", "SELECT * FROM items"),
            query("audit_read", "INSERT INTO audit VALUES (?, ?)"),
        ],
        vec![hook("expensive", "items", HookDirection::After, criteria, "audit_read")],
    )
}

fn seeded() -> MemoryConnector {
    let db = MemoryConnector::new();
    db.seed(
        "items",
        &["name", "price"],
        vec![vec![json!("pen"), json!(5)], vec![json!("lamp"), json!(250)]],
    );
    db
}

/// Only rows passing the criteria reach the callback.
#[tokio::test]
async fn test_criteria_filters_callback_rows() {
    let db = seeded();
    let op = operator(&audited_reads("price > 100"), &db);

    let rows = op.query_map("items", vec![], vec![], &mut context()).await.unwrap();
    assert_eq!(rows.len(), 2);

    let audit = db.table("audit");
    assert_eq!(audit.len(), 1);
    assert!(audit[0].contains(&json!("lamp")));
}

/// Criteria matching nothing skips the row without an error.
#[tokio::test]
async fn test_unmatched_criteria_skips_interceptor() {
    let db = seeded();
    let op = operator(&audited_reads("price > 1000"), &db);

    let rows = op.query_map("items", vec![], vec![], &mut context()).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(db.table("audit").is_empty());
}

// =============================================================================
// Batches
// =============================================================================

/// Statement 2 of 3 fails: nothing of the batch is visible afterwards.
#[tokio::test]
async fn test_failed_statement_undoes_batch() {
    let db = MemoryConnector::new();
    db.seed("items", &["name", "price"], vec![vec![json!("pen"), json!(5)]]);
    let store = store(
        vec![query(
            "restock",
            "INSERT INTO items VALUES (?, ?); SIGNAL SQLSTATE '45000'; DELETE FROM items",
        )],
        vec![],
    );
    let op = operator(&store, &db);

    let result = op
        .exec("restock", vec![vec![json!("ink"), json!(3)]], vec![], &mut context())
        .await;
    assert!(result.is_err());
    assert_eq!(db.table("items"), vec![vec![json!("pen"), json!(5)]]);
    assert_eq!(db.commits(), 0);
}

/// Unknown api tokens never reach the database.
#[tokio::test]
async fn test_unknown_token_is_denied() {
    let db = seeded();
    let op = operator(&audited_reads(""), &db);
    let mut ctx = RequestContext::new("a1", "stolen");

    let err = op.query_map("items", vec![], vec![], &mut ctx).await.unwrap_err();
    assert_eq!(err.to_string(), "Authentication failed.");
    assert_eq!(err.status_code(), 401);
    assert!(db.table("audit").is_empty());
}
