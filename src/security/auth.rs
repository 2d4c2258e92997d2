//! Basic-Auth gate in front of the relay.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::AuthConfig;
use crate::observability::metrics;

/// Challenge sent with every 401.
pub const WWW_AUTHENTICATE_CHALLENGE: &str = "Basic realm=\"Proxy Authentication Required\"";

/// Check an `Authorization` header value against the expected credentials.
///
/// Anything that is not `Basic <base64(user:pass)>` with exactly matching
/// values is a denial; malformed input never errors.
pub fn validate(header: Option<&str>, expected_user: &str, expected_pass: &str) -> bool {
    let Some((scheme, payload)) = header.and_then(|h| h.split_once(' ')) else {
        return false;
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return false;
    }

    let Ok(decoded) = STANDARD.decode(payload) else {
        return false;
    };
    let Ok(credentials) = String::from_utf8(decoded) else {
        return false;
    };

    match credentials.split_once(':') {
        Some((user, pass)) => user == expected_user && pass == expected_pass,
        None => false,
    }
}

/// Configured credentials; `None` means authentication is disabled.
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    credentials: Option<(String, String)>,
}

impl AuthGate {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            credentials: config
                .credentials()
                .map(|(user, pass)| (user.to_string(), pass.to_string())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Whether a request carrying `headers` may pass.
    pub fn allows(&self, headers: &HeaderMap) -> bool {
        match &self.credentials {
            None => true,
            Some((user, pass)) => {
                let header = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok());
                validate(header, user, pass)
            }
        }
    }
}

/// Startup warning for an auth configuration that leaves the relay open.
pub fn open_relay_warning(config: &AuthConfig) -> Option<&'static str> {
    if config.credentials().is_some() {
        return None;
    }
    let set = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
    if set(&config.username) || set(&config.password) {
        Some("Only one of username/password is configured; authentication is disabled")
    } else {
        Some("AUTH_USERNAME/AUTH_PASSWORD not set, relay is open to everyone")
    }
}

/// Rejects unauthenticated requests with a Basic challenge.
pub async fn basic_auth_middleware(
    State(gate): State<Arc<AuthGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if gate.allows(request.headers()) {
        return next.run(request).await;
    }

    tracing::debug!(
        method = %request.method(),
        path = %request.uri().path(),
        "Rejected request without valid credentials"
    );
    metrics::record_auth_rejection();
    unauthorized()
}

/// The 401 answer for failed authentication.
pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, WWW_AUTHENTICATE_CHALLENGE)],
        "Unauthorized",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic(raw: &str) -> String {
        format!("Basic {}", STANDARD.encode(raw))
    }

    #[test]
    fn accepts_matching_credentials() {
        for (user, pass) in [("alice", "secret"), ("", ""), ("ü", "pässwörd"), ("a b", " c ")] {
            let header = basic(&format!("{}:{}", user, pass));
            assert!(validate(Some(&header), user, pass), "{user}:{pass}");
        }
    }

    #[test]
    fn password_may_contain_colons() {
        let header = basic("alice:se:cr:et");
        assert!(validate(Some(&header), "alice", "se:cr:et"));
        assert!(!validate(Some(&header), "alice", "se"));
    }

    #[test]
    fn comparison_is_exact() {
        let header = basic("Alice:secret ");
        assert!(!validate(Some(&header), "alice", "secret"));
        assert!(!validate(Some(&header), "Alice", "secret"));
        assert!(validate(Some(&header), "Alice", "secret "));
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(!validate(None, "alice", "secret"));
        assert!(!validate(Some(""), "alice", "secret"));
        assert!(!validate(Some(&STANDARD.encode("alice:secret")), "alice", "secret"));
        assert!(!validate(Some("Bearer YWxpY2U6c2VjcmV0"), "alice", "secret"));
        assert!(!validate(Some("Basic !!!not-base64!!!"), "alice", "secret"));
        assert!(!validate(Some(&basic("alicesecret")), "alice", "secret"));
        assert!(!validate(Some("Basic //79/A=="), "alice", "secret"));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let header = format!("basic {}", STANDARD.encode("alice:secret"));
        assert!(validate(Some(&header), "alice", "secret"));
    }

    #[test]
    fn disabled_gate_allows_everything() {
        let gate = AuthGate::from_config(&AuthConfig {
            username: Some("alice".into()),
            password: None,
        });
        assert!(!gate.is_enabled());
        assert!(gate.allows(&HeaderMap::new()));
    }

    #[test]
    fn enabled_gate_reads_authorization_header() {
        let gate = AuthGate::from_config(&AuthConfig {
            username: Some("alice".into()),
            password: Some("secret".into()),
        });
        let mut headers = HeaderMap::new();
        assert!(!gate.allows(&headers));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&basic("alice:secret")).unwrap(),
        );
        assert!(gate.allows(&headers));
    }

    #[test]
    fn partial_credentials_are_warned_about() {
        let partial = AuthConfig {
            username: Some("alice".into()),
            password: Some(String::new()),
        };
        assert_eq!(
            open_relay_warning(&partial),
            Some("Only one of username/password is configured; authentication is disabled")
        );

        let unset = AuthConfig::default();
        assert_eq!(
            open_relay_warning(&unset),
            Some("AUTH_USERNAME/AUTH_PASSWORD not set, relay is open to everyone")
        );

        let full = AuthConfig {
            username: Some("alice".into()),
            password: Some("secret".into()),
        };
        assert_eq!(open_relay_warning(&full), None);
    }

    #[test]
    fn unauthorized_carries_challenge() {
        let response = unauthorized();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            WWW_AUTHENTICATE_CHALLENGE
        );
    }
}
