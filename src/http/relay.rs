//! Plain HTTP relay: one upstream call per inbound request.
//!
//! # Responsibilities
//! - Re-anchor the inbound request onto the upstream origin
//! - Apply the request header rules and forward the body as a stream
//! - Apply the response header rules and the body rewriter
//! - Turn upstream transport failures into a 500 diagnostic
//!
//! # Design Decisions
//! - Single attempt, no retries, no redirect following
//! - Bodies stream in both directions; nothing is buffered whole

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, Response, StatusCode, Version},
    response::IntoResponse,
    BoxError,
};
use bytes::Bytes;
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::ConfigError;
use crate::error::RelayError;
use crate::http::body::{is_rewritable, RewriteBody, TextRewriter};
use crate::observability::metrics;
use crate::routing::UpstreamTarget;
use crate::security::HeaderRewriter;

/// Pooled client used for every upstream call.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the upstream client (HTTP/1.1, https or plain http).
pub fn build_client() -> Result<UpstreamClient, ConfigError> {
    // tokio-tungstenite builds its own rustls config from the process default
    let _ = rustls::crypto::ring::default_provider().install_default();

    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
        .https_or_http()
        .enable_http1()
        .build();

    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

/// Statuses whose responses never carry a body.
pub fn is_bodiless(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED
    )
}

/// Forwards plain HTTP requests to the upstream.
pub struct HttpRelay {
    client: UpstreamClient,
    target: Arc<UpstreamTarget>,
    headers: HeaderRewriter,
}

impl HttpRelay {
    pub fn new(client: UpstreamClient, target: Arc<UpstreamTarget>, headers: HeaderRewriter) -> Self {
        Self {
            client,
            target,
            headers,
        }
    }

    /// Relay one request; failures become a 500 response.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let start_time = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let response = match self.forward(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(method = %method, path = %path, error = %err.diagnostic(), "Upstream error");
                metrics::record_upstream_error();
                err.into_response()
            }
        };

        tracing::debug!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            "Relayed request"
        );
        metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
        response
    }

    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, RelayError> {
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = self.target.http_uri(path_and_query)?;

        parts.uri = uri;
        parts.version = Version::HTTP_11;
        self.headers.rewrite_request(&mut parts.headers);

        let response = self
            .client
            .request(Request::from_parts(parts, body))
            .await?;

        Ok(self.client_response(response))
    }

    /// Apply the response rules to an upstream response.
    pub fn client_response<B>(&self, response: Response<B>) -> Response<Body>
    where
        B: http_body::Body<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Into<BoxError>,
    {
        let (mut parts, body) = response.into_parts();
        self.headers.rewrite_response(&mut parts.headers);

        if is_bodiless(parts.status) {
            return Response::from_parts(parts, Body::empty());
        }

        let body = if is_rewritable(&parts.headers) {
            let rewriter = TextRewriter::new(self.target.origin(), self.target.public_domain());
            Body::new(RewriteBody::new(body, rewriter))
        } else {
            Body::new(body)
        };

        Response::from_parts(parts, body)
    }
}
