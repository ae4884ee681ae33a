//! Data HTTP Routes
//!
//! `POST /api/:resource` runs one of the data operator entry points for
//! the tenant named by the `app_id` header:
//!
//! ```json
//! { "mode": "map" | "array" | "exec", "params": [...], "query_params": ["..."] }
//! ```
//!
//! Headers: `app_id`, `api_token`, optional `user_token`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::server::NodeState;
use crate::core::interceptors::param_groups;
use crate::core::{CoreError, RequestContext};

pub const APP_ID_HEADER: &str = "app_id";
pub const API_TOKEN_HEADER: &str = "api_token";
pub const USER_TOKEN_HEADER: &str = "user_token";

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    #[default]
    Map,
    Array,
    Exec,
}

#[derive(Debug, Default, Deserialize)]
pub struct DataRequest {
    #[serde(default)]
    pub mode: DataMode,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub query_params: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

fn error_response(e: CoreError) -> Response {
    let code = e.status_code();
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code,
        }),
    )
        .into_response()
}

// ==================
// Data Routes
// ==================

pub fn data_routes(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/api/:resource", post(data_handler))
        .with_state(state)
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn request_context(headers: &HeaderMap, peer: SocketAddr) -> RequestContext {
    let ctx = RequestContext::new(
        header(headers, APP_ID_HEADER).unwrap_or_default(),
        header(headers, API_TOKEN_HEADER).unwrap_or_default(),
    )
    .with_client_ip(peer.ip().to_string());
    match header(headers, USER_TOKEN_HEADER) {
        Some(token) => ctx.with_user_token(token),
        None => ctx,
    }
}

async fn data_handler(
    State(state): State<Arc<NodeState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Json(request): Json<DataRequest>,
) -> Response {
    let mut ctx = request_context(&headers, peer);
    let operator = &state.operator;
    let outcome = match request.mode {
        DataMode::Map => {
            let params = flat_params(request.params);
            operator
                .query_map(&resource, params, request.query_params, &mut ctx)
                .await
                .map(|rows| Json(rows).into_response())
        }
        DataMode::Array => {
            let params = flat_params(request.params);
            operator
                .query_array(&resource, params, request.query_params, &mut ctx)
                .await
                .map(|set| Json(json!({"headers": set.headers, "data": set.rows})).into_response())
        }
        DataMode::Exec => {
            let groups = param_groups(&request.params);
            operator
                .exec(&resource, groups, request.query_params, &mut ctx)
                .await
                .map(|results| Json(results).into_response())
        }
    };
    tracing::debug!(
        request_id = %ctx.request_id,
        app = %ctx.app_id,
        resource = %resource,
        elapsed_ms = ctx.elapsed_ms() as u64,
        ok = outcome.is_ok(),
        "data request"
    );
    outcome.unwrap_or_else(error_response)
}

fn flat_params(params: Value) -> Vec<Value> {
    match params {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
