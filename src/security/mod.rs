//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Request → auth.rs (Basic-Auth gate, 401 on failure)
//!         → headers.rs (identity substitution toward the upstream)
//!         → upstream
//! Response ← headers.rs (Content-Length, Location, hop-by-hop)
//! ```

pub mod auth;
pub mod headers;

pub use auth::{basic_auth_middleware, validate, AuthGate};
pub use headers::HeaderRewriter;
