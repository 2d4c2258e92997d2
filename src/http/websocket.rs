//! WebSocket relay.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests
//! - Complete the upgrade handshake with the client
//! - Open the upstream WebSocket in the background
//! - Run one [`PairActor`] per connection pair
//!
//! # Data Flow
//! ```text
//! Client ──frames──→ pump_client ──┐
//!                                  ├─ events ─→ PairActor ─→ client / upstream sinks
//! Upstream ─frames─→ pump_upstream ┘
//! ```
//!
//! # Design Decisions
//! - The upstream handshake is plain: no cookie or origin rewriting
//! - Ping/pong stays on each hop; only data and close frames cross
//! - Upstream failures never close the client on their own

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{
        ws::{self, WebSocket, WebSocketUpgrade},
        FromRequestParts,
    },
    http::{header, HeaderMap, Request},
    response::{IntoResponse, Response},
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use tracing::Instrument;
use uuid::Uuid;

use crate::duplex::{pump_client, pump_upstream, PairActor, RelayEvent, EVENT_CHANNEL_CAPACITY};
use crate::observability::metrics;
use crate::routing::UpstreamTarget;

type ClientSink = SplitSink<WebSocket, ws::Message>;
type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type UpstreamSink = SplitSink<UpstreamSocket, tungstenite::Message>;
type Actor = PairActor<ClientSink, ws::Message, UpstreamSink, tungstenite::Message>;

/// How long a finished pair waits for both sockets to complete their
/// closing handshakes before they are dropped.
pub const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Whether the request asks for a WebSocket upgrade.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::UPGRADE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.trim().eq_ignore_ascii_case("websocket"))
}

/// Upgrades clients and pairs them with an upstream socket.
pub struct WebSocketRelay {
    target: Arc<UpstreamTarget>,
}

impl WebSocketRelay {
    pub fn new(target: Arc<UpstreamTarget>) -> Self {
        Self { target }
    }

    pub async fn handle(&self, request: Request<Body>) -> Response {
        let (mut parts, _body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();

        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(rejection) => {
                tracing::debug!(path = %path_and_query, error = %rejection, "Rejected WebSocket upgrade");
                return rejection.into_response();
            }
        };

        let url = self.target.ws_url(&path_and_query);
        upgrade
            .on_failed_upgrade(|err| tracing::warn!(error = %err, "Client WebSocket upgrade failed"))
            .on_upgrade(move |socket| relay_socket(socket, url))
    }
}

async fn relay_socket(socket: WebSocket, url: String) {
    let pair_id = Uuid::new_v4();
    let span = tracing::info_span!("ws_pair", pair_id = %pair_id);

    async move {
        tracing::info!(upstream = %url, "Client WebSocket connected");
        metrics::ws_pair_opened();

        let (client_sink, client_stream) = socket.split();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut client_task =
            tokio::spawn(pump_client(client_stream, tx.clone()).in_current_span());
        let mut upstream_task = tokio::spawn(connect_upstream(url, tx).in_current_span());

        Actor::new(pair_id, client_sink).run(rx).await;

        // the pumps read on so both closing handshakes complete
        let drained = tokio::time::timeout(CLOSE_GRACE, async {
            let _ = (&mut client_task).await;
            let _ = (&mut upstream_task).await;
        })
        .await;
        if drained.is_err() {
            tracing::debug!("Closing handshake timed out");
        }
        client_task.abort();
        upstream_task.abort();
        metrics::ws_pair_closed();
        tracing::info!("WebSocket pair closed");
    }
    .instrument(span)
    .await
}

async fn connect_upstream(url: String, events: mpsc::Sender<RelayEvent<UpstreamSink>>) {
    match connect_async(url.as_str()).await {
        Ok((socket, _response)) => {
            let (sink, stream) = socket.split();
            if let Err(mpsc::error::SendError(event)) =
                events.send(RelayEvent::UpstreamOpen(sink)).await
            {
                // the pair finished while connecting
                if let RelayEvent::UpstreamOpen(mut sink) = event {
                    let _ = sink.close().await;
                }
                return;
            }
            pump_upstream(stream, events).await;
        }
        Err(err) => {
            let _ = events.send(RelayEvent::UpstreamFailed(err.to_string())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn upgrade_detection_ignores_case() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));

        headers.insert(header::UPGRADE, HeaderValue::from_static("WebSocket"));
        assert!(is_websocket_upgrade(&headers));

        headers.insert(header::UPGRADE, HeaderValue::from_static("h2c"));
        assert!(!is_websocket_upgrade(&headers));
    }

    #[tokio::test]
    async fn plain_request_with_upgrade_header_is_rejected() {
        let relay = WebSocketRelay::new(Arc::new(
            UpstreamTarget::from_config(&Default::default()).unwrap(),
        ));
        let request = Request::get("/ws")
            .header(header::UPGRADE, "websocket")
            .body(Body::empty())
            .unwrap();

        // no connection upgrade, version or key: axum refuses the handshake
        let response = relay.handle(request).await;
        assert!(response.status().is_client_error());
    }
}
