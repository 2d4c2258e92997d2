//! Connection-pair state machine.
//!
//! # Responsibilities
//! - Track the upstream socket state (Connecting → Open → Closed)
//! - Queue client frames while the upstream is connecting
//! - Decide where each frame and close goes
//!
//! # Design Decisions
//! - Pure: no I/O, the actor performs whatever the transitions return
//! - Queue is drained exactly once, on the Connecting → Open transition
//! - Upstream → client frames are never buffered; dropped when the client
//!   is not open
//! - Each direction propagates a close at most once
//! - Upstream failures do not close the client; only close events do

use std::collections::VecDeque;

use super::frame::{CloseInfo, Frame};

/// Upstream socket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamState {
    Connecting,
    Open,
    Closed,
}

/// What to do with a frame received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrameAction {
    /// Forward to the upstream now.
    Forward(Frame),
    /// Held until the upstream opens.
    Queued,
    /// The upstream is gone or closing.
    Dropped,
}

/// One client socket paired with one upstream socket.
#[derive(Debug)]
pub struct RelayPair {
    upstream: UpstreamState,
    client_open: bool,
    pending: VecDeque<Frame>,
    upstream_close_sent: bool,
    client_close_sent: bool,
}

impl Default for RelayPair {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayPair {
    /// A freshly upgraded client with the upstream connection under way.
    pub fn new() -> Self {
        Self {
            upstream: UpstreamState::Connecting,
            client_open: true,
            pending: VecDeque::new(),
            upstream_close_sent: false,
            client_close_sent: false,
        }
    }

    pub fn upstream_state(&self) -> UpstreamState {
        self.upstream
    }

    pub fn is_client_open(&self) -> bool {
        self.client_open
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Both sides are done with.
    pub fn is_finished(&self) -> bool {
        !self.client_open && self.upstream != UpstreamState::Open
    }

    pub fn on_client_frame(&mut self, frame: Frame) -> ClientFrameAction {
        match self.upstream {
            UpstreamState::Connecting => {
                self.pending.push_back(frame);
                ClientFrameAction::Queued
            }
            UpstreamState::Open if !self.upstream_close_sent => ClientFrameAction::Forward(frame),
            _ => ClientFrameAction::Dropped,
        }
    }

    /// Connecting → Open. Returns the queued frames in arrival order, or
    /// `None` when the pair no longer wants this connection.
    pub fn on_upstream_open(&mut self) -> Option<Vec<Frame>> {
        if self.upstream != UpstreamState::Connecting {
            return None;
        }
        self.upstream = UpstreamState::Open;
        Some(self.pending.drain(..).collect())
    }

    /// The connection attempt failed. Returns how many queued frames were lost.
    pub fn on_upstream_failed(&mut self) -> usize {
        self.upstream = UpstreamState::Closed;
        let lost = self.pending.len();
        self.pending.clear();
        lost
    }

    /// The upstream stream ended without a close frame.
    pub fn on_upstream_lost(&mut self) {
        self.upstream = UpstreamState::Closed;
        self.pending.clear();
    }

    /// Frames from the upstream pass only while the client is open.
    pub fn on_upstream_frame(&self, frame: Frame) -> Option<Frame> {
        self.client_open.then_some(frame)
    }

    /// The client closed (or vanished). Returns the close to send upstream.
    pub fn on_client_close(&mut self, close: CloseInfo) -> Option<CloseInfo> {
        self.client_open = false;
        match self.upstream {
            UpstreamState::Connecting => {
                self.upstream = UpstreamState::Closed;
                self.pending.clear();
                None
            }
            UpstreamState::Open if !self.upstream_close_sent => {
                self.upstream_close_sent = true;
                Some(close)
            }
            _ => None,
        }
    }

    /// The upstream closed. Returns the close to send to the client.
    pub fn on_upstream_close(&mut self, close: CloseInfo) -> Option<CloseInfo> {
        self.upstream = UpstreamState::Closed;
        if self.client_open && !self.client_close_sent {
            self.client_close_sent = true;
            self.client_open = false;
            Some(close)
        } else {
            None
        }
    }
}
