//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate the upstream origin and public domain shape
//! - Validate addresses and header-bound values
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;
use url::Url;

use crate::config::schema::RelayConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("upstream origin '{0}' is not an absolute URL")]
    OriginUrl(String),

    #[error("upstream origin '{0}' must use http or https")]
    OriginScheme(String),

    #[error("upstream origin '{0}' must not carry a path, query or fragment")]
    OriginPath(String),

    #[error("public domain must not be empty")]
    PublicDomainEmpty,

    #[error("public domain '{0}' must be a bare host, without scheme or path")]
    PublicDomainShape(String),

    #[error("session cookie is not a valid header value")]
    Cookie,

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
}

/// Check a loaded configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    validate_origin(&config.upstream.origin, &mut errors);

    let domain = &config.upstream.public_domain;
    if domain.is_empty() {
        errors.push(ValidationError::PublicDomainEmpty);
    } else if domain.contains("://") || domain.contains('/') || domain.contains(char::is_whitespace) {
        errors.push(ValidationError::PublicDomainShape(domain.clone()));
    }

    if let Some(cookie) = &config.session.cookie {
        if HeaderValue::from_str(cookie).is_err() {
            errors.push(ValidationError::Cookie);
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_origin(origin: &str, errors: &mut Vec<ValidationError>) {
    let url = match Url::parse(origin) {
        Ok(url) if url.has_host() => url,
        _ => {
            errors.push(ValidationError::OriginUrl(origin.to_string()));
            return;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        errors.push(ValidationError::OriginScheme(origin.to_string()));
    }

    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        errors.push(ValidationError::OriginPath(origin.to_string()));
    }
}
