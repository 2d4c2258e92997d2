//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overlay (AUTH_USERNAME, AUTH_PASSWORD, cookie, PORT)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → handed by value to HttpServer::new
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthConfig, ListenerConfig, LogFormat, ObservabilityConfig, RelayConfig, SessionConfig,
    UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
