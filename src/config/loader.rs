//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable holding the relay username.
pub const ENV_USERNAME: &str = "AUTH_USERNAME";
/// Environment variable holding the relay password.
pub const ENV_PASSWORD: &str = "AUTH_PASSWORD";
/// Environment variables holding the upstream session cookie, first match wins.
pub const ENV_COOKIE: [&str; 2] = ["cookie", "COOKIE"];
/// Environment variable overriding the listening port.
pub const ENV_PORT: &str = "PORT";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("invalid header value for {name}")]
    Header { name: &'static str },

    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a configuration from a TOML file, without validating it.
pub fn load_file(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Overlay the secrets and port taken from the environment.
///
/// `lookup` is usually `|key| std::env::var(key).ok()`.
pub fn apply_env<F>(config: &mut RelayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(user) = lookup(ENV_USERNAME) {
        config.auth.username = Some(user);
    }
    if let Some(pass) = lookup(ENV_PASSWORD) {
        config.auth.password = Some(pass);
    }
    if let Some(cookie) = ENV_COOKIE.iter().find_map(|key| lookup(key)) {
        config.session.cookie = Some(cookie);
    }
    if let Some(port) = lookup(ENV_PORT) {
        config.listener.bind_address = replace_port(&config.listener.bind_address, &port);
    }
}

/// Swap the port of a `host:port` bind address.
pub fn replace_port(bind_address: &str, port: &str) -> String {
    match bind_address.rsplit_once(':') {
        Some((host, _)) => format!("{}:{}", host, port),
        None => format!("{}:{}", bind_address, port),
    }
}

/// Load (optionally) from a file, overlay the environment, and validate.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_file(path)?,
        None => RelayConfig::default(),
    };
    apply_env(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
