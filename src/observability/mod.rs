//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Relays and the auth gate produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! The request id from the HTTP layer is recorded on every request span.

pub mod logging;
pub mod metrics;
