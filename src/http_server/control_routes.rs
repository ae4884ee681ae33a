//! Control HTTP Routes
//!
//! - `POST /sys/cli`: CLI envelope in, plain text out
//! - `GET /sys/ws`: slave channel (master only)
//! - `GET|POST /sys/shutdown`: stop the node, loopback callers only

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use super::server::NodeState;
use crate::replication::Envelope;

/// Answer to a shutdown request from anywhere but the local host
pub const SHUTDOWN_REFUSED: &str = "Attack!!!";

pub fn control_routes(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/sys/cli", post(cli_handler))
        .route("/sys/ws", get(ws_handler))
        .route("/sys/shutdown", get(shutdown_handler).post(shutdown_handler))
        .with_state(state)
}

async fn cli_handler(State(state): State<Arc<NodeState>>, body: String) -> String {
    match Envelope::from_json(&body) {
        Ok(envelope) => state.control.handle(envelope).await,
        Err(e) => e.to_string(),
    }
}

async fn ws_handler(
    State(state): State<Arc<NodeState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    match &state.hub {
        Some(hub) => {
            let hub = Arc::clone(hub);
            ws.on_upgrade(move |socket| hub.serve(socket, peer))
        }
        None => (StatusCode::NOT_FOUND, "Not a master.").into_response(),
    }
}

async fn shutdown_handler(
    State(state): State<Arc<NodeState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> (StatusCode, &'static str) {
    if !peer.ip().is_loopback() {
        tracing::warn!(peer = %peer, "remote shutdown refused");
        return (StatusCode::FORBIDDEN, SHUTDOWN_REFUSED);
    }
    tracing::info!("shutdown requested");
    state.shutdown.notify_one();
    (StatusCode::OK, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_server::server::tests::{body_text, master_state};
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use tower::ServiceExt;

    fn router(peer: [u8; 4]) -> (Router, Arc<NodeState>) {
        let state = master_state();
        let router = control_routes(Arc::clone(&state))
            .layer(MockConnectInfo(SocketAddr::from((peer, 40000))));
        (router, state)
    }

    #[tokio::test]
    async fn test_cli_round_trip() {
        let (router, _) = router([127, 0, 0, 1]);
        let add = r#"{"Type":"CLI_DN_ADD","Data":"{\"Name\":\"d2\",\"Host\":\"db2\",\"Port\":3306}"}"#;
        let response = router
            .clone()
            .oneshot(Request::post("/sys/cli").body(Body::from(add)).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "");

        let list = r#"{"Type":"CLI_DN_LIST","Data":"full"}"#;
        let response = router
            .oneshot(Request::post("/sys/cli").body(Body::from(list)).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "d1 h\nd2 db2\n");
    }

    #[tokio::test]
    async fn test_cli_duplicate_is_error_text() {
        let (router, _) = router([127, 0, 0, 1]);
        let add = r#"{"Type":"CLI_DN_ADD","Data":"{\"Name\":\"d1\",\"Host\":\"h\",\"Port\":3306}"}"#;
        let response = router
            .oneshot(Request::post("/sys/cli").body(Body::from(add)).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "Data node existed: d1");
    }

    #[tokio::test]
    async fn test_garbage_envelope_is_error_text() {
        let (router, _) = router([127, 0, 0, 1]);
        let response = router
            .oneshot(Request::post("/sys/cli").body(Body::from("nope")).unwrap())
            .await
            .unwrap();
        assert!(body_text(response).await.starts_with("Invalid data for envelope"));
    }

    #[tokio::test]
    async fn test_remote_shutdown_refused() {
        let (router, _) = router([10, 1, 2, 3]);
        let response = router
            .oneshot(Request::get("/sys/shutdown").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, SHUTDOWN_REFUSED);
    }

    #[tokio::test]
    async fn test_local_shutdown_signals() {
        let (router, state) = router([127, 0, 0, 1]);
        let response = router
            .oneshot(Request::get("/sys/shutdown").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // the stored permit completes immediately
        tokio::time::timeout(std::time::Duration::from_secs(1), state.shutdown.notified())
            .await
            .unwrap();
    }
}
