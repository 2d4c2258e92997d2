//! Per-request relay failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// A failure while relaying one request to the upstream.
///
/// Every variant is answered with a 500 carrying a short diagnostic; nothing
/// here is fatal to the process.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connection refused, DNS failure, TLS failure, reset mid-request.
    #[error("{0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// The inbound path and query could not be re-anchored on the upstream.
    #[error("invalid upstream target: {0}")]
    InvalidTarget(#[from] axum::http::uri::InvalidUri),
}

impl RelayError {
    /// Diagnostic including the error's source chain.
    pub fn diagnostic(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            let text = err.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = err.source();
        }
        message
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Proxy Error: {}", self.diagnostic()),
        )
            .into_response()
    }
}
