//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the relay components from configuration
//! - Create the Axum router with a catch-all handler
//! - Wire up middleware (request id, tracing, Basic auth)
//! - Dispatch each request to the HTTP or WebSocket relay
//! - Serve until the shutdown signal fires

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::Response,
    routing::any,
    Router,
};
use tokio::{net::TcpListener, sync::broadcast};
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, RelayConfig};
use crate::http::relay::{build_client, HttpRelay};
use crate::http::request;
use crate::http::websocket::{is_websocket_upgrade, WebSocketRelay};
use crate::lifecycle::shutdown;
use crate::routing::UpstreamTarget;
use crate::security::{auth::open_relay_warning, basic_auth_middleware, AuthGate, HeaderRewriter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub http: Arc<HttpRelay>,
    pub websocket: Arc<WebSocketRelay>,
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: RelayConfig,
}

impl HttpServer {
    /// Create a server from a validated configuration.
    pub fn new(config: RelayConfig) -> Result<Self, ConfigError> {
        let target = Arc::new(
            UpstreamTarget::from_config(&config.upstream)
                .map_err(|err| ConfigError::Validation(vec![err]))?,
        );
        let headers = HeaderRewriter::new(
            &target,
            config.session.cookie.as_deref(),
            config.upstream.force_identity_encoding,
        )?;
        let client = build_client()?;

        let state = AppState {
            http: Arc::new(HttpRelay::new(client, target.clone(), headers)),
            websocket: Arc::new(WebSocketRelay::new(target)),
        };

        let gate = Arc::new(AuthGate::from_config(&config.auth));
        if let Some(warning) = open_relay_warning(&config.auth) {
            tracing::warn!("{}", warning);
        }
        if config.session.cookie.is_none() {
            tracing::warn!("No session cookie configured, upstream requests are anonymous");
        }

        let router = Self::build_router(state, gate);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, gate: Arc<AuthGate>) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(gate, basic_auth_middleware))
            .layer(TraceLayer::new_for_http().make_span_with(request::make_span))
            .layer(request::propagate_request_id())
            .layer(request::set_request_id())
    }

    /// The fully layered router, for driving the relay without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.origin,
            public_domain = %self.config.upstream.public_domain,
            "Relay listening"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// Catch-all handler: WebSocket upgrades go to the pairing relay, the rest
/// to the HTTP relay.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    if is_websocket_upgrade(request.headers()) {
        state.websocket.handle(request).await
    } else {
        state.http.handle(request).await
    }
}
