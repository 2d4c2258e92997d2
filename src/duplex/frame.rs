//! Library-neutral WebSocket messages.
//!
//! The client side speaks axum's WebSocket types and the upstream side speaks
//! tungstenite's; both are converted to [`Frame`] and [`CloseInfo`] at the
//! edges so the pair state machine sees one vocabulary.

use axum::extract::ws;
use bytes::Bytes;
use tokio_tungstenite::tungstenite;
use tungstenite::protocol::frame::coding::CloseCode;

/// Close code meaning "no status code was present" (RFC 6455 §7.4.1).
/// Never sent on the wire; it maps to a close frame without payload.
pub const NO_STATUS: u16 = 1005;

/// A data message relayed between the two sockets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

/// Close code and reason of a closing handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// A close that carried no payload.
    pub fn no_status() -> Self {
        Self::new(NO_STATUS, "")
    }

    fn has_payload(&self) -> bool {
        self.code != NO_STATUS
    }
}

/// What a received message means to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame(Frame),
    Close(CloseInfo),
    /// Ping, pong and raw frames; answered by the socket library itself.
    Control,
}

/// Conversion between a socket library's message type and relay frames.
pub trait WireMessage: Sized {
    fn from_frame(frame: Frame) -> Self;
    fn close(close: CloseInfo) -> Self;
    fn classify(self) -> Inbound;
}

impl WireMessage for ws::Message {
    fn from_frame(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => ws::Message::Text(text.into()),
            Frame::Binary(data) => ws::Message::Binary(data),
        }
    }

    fn close(close: CloseInfo) -> Self {
        if !close.has_payload() {
            return ws::Message::Close(None);
        }
        ws::Message::Close(Some(ws::CloseFrame {
            code: close.code,
            reason: close.reason.into(),
        }))
    }

    fn classify(self) -> Inbound {
        match self {
            ws::Message::Text(text) => Inbound::Frame(Frame::Text(text.as_str().to_owned())),
            ws::Message::Binary(data) => Inbound::Frame(Frame::Binary(data)),
            ws::Message::Close(Some(frame)) => {
                Inbound::Close(CloseInfo::new(frame.code, frame.reason.as_str()))
            }
            ws::Message::Close(None) => Inbound::Close(CloseInfo::no_status()),
            ws::Message::Ping(_) | ws::Message::Pong(_) => Inbound::Control,
        }
    }
}

impl WireMessage for tungstenite::Message {
    fn from_frame(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => tungstenite::Message::Text(text.into()),
            Frame::Binary(data) => tungstenite::Message::Binary(data),
        }
    }

    fn close(close: CloseInfo) -> Self {
        if !close.has_payload() {
            return tungstenite::Message::Close(None);
        }
        tungstenite::Message::Close(Some(tungstenite::protocol::CloseFrame {
            code: CloseCode::from(close.code),
            reason: close.reason.into(),
        }))
    }

    fn classify(self) -> Inbound {
        match self {
            tungstenite::Message::Text(text) => {
                Inbound::Frame(Frame::Text(text.as_str().to_owned()))
            }
            tungstenite::Message::Binary(data) => Inbound::Frame(Frame::Binary(data)),
            tungstenite::Message::Close(Some(frame)) => {
                Inbound::Close(CloseInfo::new(u16::from(frame.code), frame.reason.as_str()))
            }
            tungstenite::Message::Close(None) => Inbound::Close(CloseInfo::no_status()),
            tungstenite::Message::Ping(_)
            | tungstenite::Message::Pong(_)
            | tungstenite::Message::Frame(_) => Inbound::Control,
        }
    }
}
