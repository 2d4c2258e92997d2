//! The fixed upstream identity.
//!
//! Every inbound path+query is re-anchored onto the single configured
//! upstream origin; there is no route table.

use axum::http::uri::{InvalidUri, Uri};
use url::Url;

use crate::config::{UpstreamConfig, ValidationError};

/// Upstream origin plus the public identity that replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    /// `scheme://host[:port]`, no trailing slash.
    origin: String,
    /// `host[:port]`, the value sent in `Host`.
    host: String,
    /// Same authority with the WebSocket scheme.
    ws_origin: String,
    /// Public hostname substituted into bodies.
    public_domain: String,
    /// `https://<public_domain>`, substituted into `Location`.
    public_base: String,
}

impl UpstreamTarget {
    /// Derive the target from validated configuration.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, ValidationError> {
        let url = Url::parse(&config.origin)
            .map_err(|_| ValidationError::OriginUrl(config.origin.clone()))?;

        let ws_scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            _ => return Err(ValidationError::OriginScheme(config.origin.clone())),
        };

        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(ValidationError::OriginUrl(config.origin.clone())),
        };

        Ok(Self {
            origin: url.origin().ascii_serialization(),
            ws_origin: format!("{}://{}", ws_scheme, host),
            host,
            public_domain: config.public_domain.clone(),
            public_base: format!("https://{}", config.public_domain),
        })
    }

    /// Upstream URI for an inbound path and query.
    pub fn http_uri(&self, path_and_query: &str) -> Result<Uri, InvalidUri> {
        format!("{}{}", self.origin, anchor(path_and_query)).parse()
    }

    /// Upstream WebSocket URL for an inbound path and query.
    pub fn ws_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.ws_origin, anchor(path_and_query))
    }

    /// `Referer` presented to the upstream.
    pub fn referer(&self) -> String {
        format!("{}/?referrer=website", self.origin)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn public_domain(&self) -> &str {
        &self.public_domain
    }

    pub fn public_base(&self) -> &str {
        &self.public_base
    }
}

fn anchor(path_and_query: &str) -> &str {
    if path_and_query.is_empty() {
        "/"
    } else {
        path_and_query
    }
}
