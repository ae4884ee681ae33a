//! Master Configuration Tests
//!
//! CLI envelopes applied through the master control plane:
//! - listing output after data node and app registration
//! - rejected mutations leave the version untouched
//! - every accepted mutation is persisted and reloads identically

use std::sync::Arc;

use netgate::master::{App, DataNode, MasterData, MasterStore, Query, Token};
use netgate::replication::{ControlCommand, ControlPlane, Envelope, SlaveRegistry, META_APP_ID};
use tempfile::TempDir;

fn plane(store: &Arc<MasterStore>) -> ControlPlane {
    ControlPlane::master(Arc::clone(store), Arc::new(SlaveRegistry::new()))
}

async fn apply(plane: &ControlPlane, command: ControlCommand) -> String {
    plane.handle(command.encode().unwrap()).await
}

fn data_node() -> ControlCommand {
    ControlCommand::AddDataNode(DataNode {
        name: "d1".into(),
        host: "h".into(),
        port: 3306,
        ..Default::default()
    })
}

fn app(data_node_id: &str) -> ControlCommand {
    ControlCommand::AddApp(App {
        name: "a1".into(),
        db_name: "a1".into(),
        data_node_id: data_node_id.into(),
        ..Default::default()
    })
}

// =============================================================================
// Listing
// =============================================================================

/// Register d1, then a1 on it: compact and full app listings.
#[tokio::test]
async fn test_app_listing_after_registration() {
    let store = Arc::new(MasterStore::new(MasterData::default()));
    let plane = plane(&store);

    assert_eq!(apply(&plane, data_node()).await, "");
    let node_id = store.current().data_nodes[0].id.clone();
    assert_eq!(apply(&plane, app(&node_id)).await, "");

    assert_eq!(plane.handle(Envelope::new("CLI_APP_LIST", "compact")).await, "a1 ");
    assert_eq!(plane.handle(Envelope::new("CLI_APP_LIST", "full")).await, "a1 d1\n");
    assert_eq!(store.current().version, 2);
}

/// Listings scoped by `Meta.AppId` only show that app's entities.
#[tokio::test]
async fn test_scoped_query_listing() {
    let store = Arc::new(MasterStore::new(MasterData::default()));
    let plane = plane(&store);
    apply(&plane, data_node()).await;
    let node_id = store.current().data_nodes[0].id.clone();
    apply(&plane, app(&node_id)).await;
    let app_id = store.current().apps[0].id.clone();

    let added = apply(
        &plane,
        ControlCommand::AddQuery(Query {
            name: "orders".into(),
            script_text: "SELECT * FROM orders".into(),
            app_id: app_id.clone(),
            ..Default::default()
        }),
    )
    .await;
    assert_eq!(added, "");

    let scoped =
        Envelope::new("CLI_QUERY_LIST", "compact").with_meta(META_APP_ID, app_id.as_str());
    assert_eq!(plane.handle(scoped).await, "orders ");
    let other = Envelope::new("CLI_QUERY_LIST", "compact").with_meta(META_APP_ID, "nobody");
    assert_eq!(plane.handle(other).await, "");
}

// =============================================================================
// Validation
// =============================================================================

/// Dangling references fail with error text and no version change.
#[tokio::test]
async fn test_dangling_references_rejected() {
    let store = Arc::new(MasterStore::new(MasterData::default()));
    let plane = plane(&store);

    let answer = apply(&plane, app("ghost")).await;
    assert!(!answer.is_empty());
    assert_eq!(store.current().version, 0);

    let answer = apply(
        &plane,
        ControlCommand::AddToken(Token {
            name: "web".into(),
            app_id: "ghost".into(),
            ..Default::default()
        }),
    )
    .await;
    assert!(!answer.is_empty());
    assert_eq!(store.current().version, 0);
    assert!(store.current().apps.is_empty());
}

// =============================================================================
// Persistence
// =============================================================================

/// The data file always holds the latest version and reloads identically.
#[tokio::test]
async fn test_persisted_snapshot_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("netgate_master.json");
    let store = Arc::new(MasterStore::open(&path).unwrap());
    let plane = plane(&store);

    apply(&plane, data_node()).await;
    let node_id = store.current().data_nodes[0].id.clone();
    apply(&plane, app(&node_id)).await;
    let app_id = store.current().apps[0].id.clone();
    apply(
        &plane,
        ControlCommand::AddToken(Token {
            name: "web".into(),
            mode: "rw".into(),
            target: "orders,users".into(),
            app_id,
            ..Default::default()
        }),
    )
    .await;

    let reloaded = MasterStore::open(&path).unwrap();
    assert_eq!(*reloaded.current(), *store.current());
    assert_eq!(reloaded.current().version, 3);
    assert_eq!(reloaded.current().apps[0].tokens[0].target, "orders,users");
}
