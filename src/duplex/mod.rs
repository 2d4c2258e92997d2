//! WebSocket pairing between a client socket and its upstream socket.
//!
//! - [`frame`]: library-neutral messages and close information
//! - [`pair`]: the pure state machine for one pair
//! - [`actor`]: the task that owns both write halves and drives the pair

pub mod actor;
pub mod frame;
pub mod pair;

pub use actor::{pump_client, pump_upstream, PairActor, RelayEvent, EVENT_CHANNEL_CAPACITY};
pub use frame::{CloseInfo, Frame, Inbound, WireMessage, NO_STATUS};
pub use pair::{ClientFrameAction, RelayPair, UpstreamState};
