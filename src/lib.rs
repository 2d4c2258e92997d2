//! Single-origin relay.
//!
//! Exposes one fixed upstream site under another domain: Basic auth at the
//! door, upstream session credentials injected on the way in, the upstream
//! origin rewritten out of text bodies and redirects on the way back, and
//! WebSocket connections paired one to one.

pub mod config;
pub mod duplex;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::RelayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
