//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level when it is set. JSON output is
//! meant for production, pretty output for a terminal.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global subscriber. Call once, before anything logs.
pub fn init(config: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Filter directives for a bare level such as `info`.
///
/// A value that already contains directives is used as is.
pub fn default_directives(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("origin_relay={level},tower_http={level},warn")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_scopes_to_crate() {
        assert_eq!(
            default_directives("debug"),
            "origin_relay=debug,tower_http=debug,warn"
        );
    }

    #[test]
    fn directives_pass_through() {
        assert_eq!(default_directives("origin_relay=trace"), "origin_relay=trace");
        assert!(EnvFilter::try_new(default_directives("info")).is_ok());
    }
}
