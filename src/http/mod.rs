//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, auth, dispatch)
//!     → relay.rs (plain HTTP: headers + body rewriting, one upstream call)
//!     → websocket.rs (upgrade, connection pair actor)
//!     → Send to client
//! ```

pub mod body;
pub mod relay;
pub mod request;
pub mod server;
pub mod websocket;

pub use relay::HttpRelay;
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
pub use websocket::{is_websocket_upgrade, WebSocketRelay};
