//! Header substitution between the client and the upstream.
//!
//! # Responsibilities
//! - Present the upstream's own identity (Host, Origin, Referer) on requests
//! - Replace client cookies with the configured session cookie
//! - Never forward the relay's Authorization header
//! - Strip hop-by-hop headers in both directions
//! - Hide the upstream identity in redirect `Location` headers
//!
//! # Design Decisions
//! - Header values derived from config are built once; invalid values fail
//!   at startup, never per request
//! - Everything not named here passes through untouched

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::config::ConfigError;
use crate::routing::UpstreamTarget;

/// Headers that only describe a single hop.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Applies the request and response header rules for one upstream.
#[derive(Debug, Clone)]
pub struct HeaderRewriter {
    host: HeaderValue,
    origin: HeaderValue,
    referer: HeaderValue,
    cookie: HeaderValue,
    upstream_base: String,
    public_base: String,
    force_identity_encoding: bool,
}

impl HeaderRewriter {
    pub fn new(
        target: &UpstreamTarget,
        cookie: Option<&str>,
        force_identity_encoding: bool,
    ) -> Result<Self, ConfigError> {
        let value = |name: &'static str, raw: &str| {
            HeaderValue::from_str(raw).map_err(|_| ConfigError::Header { name })
        };

        Ok(Self {
            host: value("host", target.host())?,
            origin: value("origin", target.origin())?,
            referer: value("referer", &target.referer())?,
            cookie: value("cookie", cookie.unwrap_or_default())?,
            upstream_base: target.origin().to_string(),
            public_base: target.public_base().to_string(),
            force_identity_encoding,
        })
    }

    /// Turn the client's headers into the headers sent upstream.
    pub fn rewrite_request(&self, headers: &mut HeaderMap) {
        strip_hop_by_hop(headers);

        headers.insert(header::HOST, self.host.clone());

        headers.remove(header::REFERER);
        headers.remove(header::COOKIE);
        headers.remove(header::ORIGIN);
        headers.remove(header::AUTHORIZATION);

        headers.insert(header::COOKIE, self.cookie.clone());
        headers.insert(header::ORIGIN, self.origin.clone());
        headers.insert(header::REFERER, self.referer.clone());

        if self.force_identity_encoding {
            headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        }
    }

    /// Turn the upstream's response headers into the headers sent to the client.
    pub fn rewrite_response(&self, headers: &mut HeaderMap) {
        strip_hop_by_hop(headers);
        headers.remove(header::CONTENT_LENGTH);

        let rewritten = headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|location| location.contains(&self.upstream_base))
            .map(|location| location.replace(&self.upstream_base, &self.public_base));

        if let Some(location) = rewritten {
            match HeaderValue::from_str(&location) {
                Ok(value) => {
                    headers.insert(header::LOCATION, value);
                }
                Err(_) => tracing::warn!(%location, "Rewritten Location is not a valid header"),
            }
        }
    }
}

/// Removes the fixed hop-by-hop set plus anything `Connection` names.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
