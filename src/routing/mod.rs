//! Request targeting subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (path + query)
//!     → target.rs (re-anchor onto the fixed upstream origin)
//!     → https://<upstream-host><path><query>   (HTTP relay)
//!     → wss://<upstream-host><path><query>     (WebSocket relay)
//! ```
//!
//! # Design Decisions
//! - Exactly one upstream; no route table, no host matching
//! - Target derived once at startup, immutable afterwards

pub mod target;

pub use target::UpstreamTarget;
