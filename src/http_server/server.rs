//! # HTTP Server
//!
//! One listener per node serving the control routes and the data routes.
//! A loopback `/sys/shutdown` request stops it gracefully and, on a
//! master, closes every slave connection.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::config::HttpServerConfig;
use super::control_routes::control_routes;
use super::data_routes::data_routes;
use crate::core::DataOperator;
use crate::replication::{ControlPlane, MasterHub};

// ==================
// Shared State
// ==================

/// Node services shared across handlers
pub struct NodeState {
    pub control: Arc<ControlPlane>,
    /// Slave channel, present on the master only
    pub hub: Option<Arc<MasterHub>>,
    pub operator: Arc<DataOperator>,
    pub shutdown: Arc<Notify>,
}

impl NodeState {
    pub fn new(control: Arc<ControlPlane>, operator: Arc<DataOperator>) -> Self {
        Self {
            control,
            hub: None,
            operator,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn with_hub(mut self, hub: Arc<MasterHub>) -> Self {
        self.hub = Some(hub);
        self
    }
}

/// HTTP server for one gateway node
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
    shutdown: Arc<Notify>,
    hub: Option<Arc<MasterHub>>,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: Arc<NodeState>) -> Self {
        let shutdown = Arc::clone(&state.shutdown);
        let hub = state.hub.clone();
        let router = Self::build_router(&config, state);
        Self {
            config,
            router,
            shutdown,
            hub,
        }
    }

    fn build_router(config: &HttpServerConfig, state: Arc<NodeState>) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(control_routes(Arc::clone(&state)))
            .merge(data_routes(state))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind the configured address and serve until shutdown
    pub async fn start(self) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(self.socket_addr()).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(self, listener: TcpListener) -> Result<(), std::io::Error> {
        tracing::info!(addr = %listener.local_addr()?, "http server listening");
        let shutdown = self.shutdown;
        let hub = self.hub;
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
            // upgraded slave sockets outlive the listener otherwise
            if let Some(hub) = hub {
                hub.close();
            }
        })
        .await?;
        tracing::info!("http server stopped");
        Ok(())
    }
}
