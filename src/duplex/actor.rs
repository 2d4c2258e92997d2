//! One actor per connection pair.
//!
//! Pump tasks turn socket traffic into [`RelayEvent`]s; the actor owns both
//! write halves and the [`RelayPair`] and handles events strictly in order,
//! so the pending queue is never touched concurrently.

use std::fmt::Display;
use std::marker::PhantomData;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::frame::{CloseInfo, Frame, Inbound, WireMessage};
use super::pair::{ClientFrameAction, RelayPair};
use crate::observability::metrics;

/// Capacity of the event channel feeding an actor.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Everything that can happen to a pair.
pub enum RelayEvent<U> {
    ClientFrame(Frame),
    ClientClosed(CloseInfo),
    /// The upstream handshake finished; carries the upstream write half.
    UpstreamOpen(U),
    UpstreamFailed(String),
    UpstreamFrame(Frame),
    UpstreamClosed(CloseInfo),
    UpstreamError(String),
    /// The upstream stream ended without a close frame.
    UpstreamEnded,
}

/// Drives a [`RelayPair`] and performs its decisions on the sockets.
pub struct PairActor<C, CM, U, UM> {
    id: Uuid,
    pair: RelayPair,
    client: C,
    upstream: Option<U>,
    _messages: PhantomData<fn() -> (CM, UM)>,
}

impl<C, CM, U, UM> PairActor<C, CM, U, UM>
where
    C: Sink<CM> + Unpin,
    C::Error: Display,
    CM: WireMessage,
    U: Sink<UM> + Unpin,
    U::Error: Display,
    UM: WireMessage,
{
    pub fn new(id: Uuid, client: C) -> Self {
        Self {
            id,
            pair: RelayPair::new(),
            client,
            upstream: None,
            _messages: PhantomData,
        }
    }

    /// Process events until the pair is finished or every producer is gone.
    pub async fn run(mut self, mut events: mpsc::Receiver<RelayEvent<U>>) -> RelayPair {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
            if self.pair.is_finished() {
                break;
            }
        }
        tracing::debug!(
            pair_id = %self.id,
            upstream = ?self.pair.upstream_state(),
            "Pair finished"
        );
        self.pair
    }

    async fn handle(&mut self, event: RelayEvent<U>) {
        match event {
            RelayEvent::ClientFrame(frame) => match self.pair.on_client_frame(frame) {
                ClientFrameAction::Forward(frame) => self.send_upstream(frame).await,
                ClientFrameAction::Queued => {
                    tracing::trace!(pair_id = %self.id, queued = self.pair.pending_len(), "Client message queued");
                }
                ClientFrameAction::Dropped => {
                    tracing::debug!(pair_id = %self.id, "Upstream unavailable, client message dropped");
                }
            },
            RelayEvent::ClientClosed(close) => {
                tracing::info!(pair_id = %self.id, code = close.code, reason = %close.reason, "Client connection closed");
                if let Some(close) = self.pair.on_client_close(close) {
                    self.close_upstream(close).await;
                }
            }
            RelayEvent::UpstreamOpen(mut sink) => match self.pair.on_upstream_open() {
                Some(pending) => {
                    tracing::info!(pair_id = %self.id, flushed = pending.len(), "Connected to upstream");
                    self.upstream = Some(sink);
                    for frame in pending {
                        self.send_upstream(frame).await;
                    }
                }
                None => {
                    tracing::debug!(pair_id = %self.id, "Discarding upstream connection opened too late");
                    let _ = sink.close().await;
                }
            },
            RelayEvent::UpstreamFailed(error) => {
                let lost = self.pair.on_upstream_failed();
                tracing::error!(pair_id = %self.id, %error, lost, "Upstream WebSocket connection failed");
                metrics::record_ws_upstream_error();
            }
            RelayEvent::UpstreamFrame(frame) => match self.pair.on_upstream_frame(frame) {
                Some(frame) => self.send_client(frame).await,
                None => {
                    tracing::trace!(pair_id = %self.id, "Client not open, upstream message dropped");
                }
            },
            RelayEvent::UpstreamClosed(close) => {
                tracing::info!(pair_id = %self.id, code = close.code, reason = %close.reason, "Upstream connection closed");
                if let Some(close) = self.pair.on_upstream_close(close) {
                    self.close_client(close).await;
                }
            }
            RelayEvent::UpstreamError(error) => {
                tracing::error!(pair_id = %self.id, %error, "Upstream WebSocket error");
                metrics::record_ws_upstream_error();
            }
            RelayEvent::UpstreamEnded => {
                tracing::warn!(pair_id = %self.id, "Upstream stream ended without a close frame");
                self.pair.on_upstream_lost();
            }
        }
    }

    async fn send_upstream(&mut self, frame: Frame) {
        let Some(sink) = self.upstream.as_mut() else {
            return;
        };
        match sink.send(UM::from_frame(frame)).await {
            Ok(()) => metrics::record_ws_frame("upstream"),
            Err(err) => {
                tracing::error!(pair_id = %self.id, error = %err, "Failed to send to upstream");
                metrics::record_ws_upstream_error();
            }
        }
    }

    async fn close_upstream(&mut self, close: CloseInfo) {
        if let Some(sink) = self.upstream.as_mut() {
            if let Err(err) = sink.send(UM::close(close)).await {
                tracing::debug!(pair_id = %self.id, error = %err, "Failed to close upstream");
            }
        }
    }

    async fn send_client(&mut self, frame: Frame) {
        match self.client.send(CM::from_frame(frame)).await {
            Ok(()) => metrics::record_ws_frame("client"),
            Err(err) => {
                tracing::debug!(pair_id = %self.id, error = %err, "Client write failed");
                if let Some(close) = self.pair.on_client_close(CloseInfo::no_status()) {
                    self.close_upstream(close).await;
                }
            }
        }
    }

    async fn close_client(&mut self, close: CloseInfo) {
        if let Err(err) = self.client.send(CM::close(close)).await {
            tracing::debug!(pair_id = %self.id, error = %err, "Failed to close client");
        }
    }
}

/// Feed client socket messages into the actor.
///
/// Keeps reading after a close until the stream ends: the socket library
/// only writes its close reply while the socket is being read.
pub async fn pump_client<S, M, E, U>(mut stream: S, events: mpsc::Sender<RelayEvent<U>>)
where
    S: Stream<Item = Result<M, E>> + Unpin,
    M: WireMessage,
    E: Display,
{
    let mut closed = false;
    while let Some(result) = stream.next().await {
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "Client read failed");
                break;
            }
        };
        if closed {
            continue;
        }
        let event = match message.classify() {
            Inbound::Frame(frame) => RelayEvent::ClientFrame(frame),
            Inbound::Close(close) => {
                closed = true;
                RelayEvent::ClientClosed(close)
            }
            Inbound::Control => continue,
        };
        // the actor may already be gone; the socket is still drained
        let _ = events.send(event).await;
    }
    if !closed {
        let _ = events.send(RelayEvent::ClientClosed(CloseInfo::no_status())).await;
    }
}

/// Feed upstream socket messages into the actor.
///
/// Like [`pump_client`], reading continues after a close.
pub async fn pump_upstream<S, M, E, U>(mut stream: S, events: mpsc::Sender<RelayEvent<U>>)
where
    S: Stream<Item = Result<M, E>> + Unpin,
    M: WireMessage,
    E: Display,
{
    let mut closed = false;
    while let Some(result) = stream.next().await {
        let event = match result {
            Ok(_) if closed => continue,
            Ok(message) => match message.classify() {
                Inbound::Frame(frame) => RelayEvent::UpstreamFrame(frame),
                Inbound::Close(close) => {
                    closed = true;
                    RelayEvent::UpstreamClosed(close)
                }
                Inbound::Control => continue,
            },
            Err(err) if closed => {
                tracing::debug!(error = %err, "Upstream read failed after close");
                continue;
            }
            Err(err) => RelayEvent::UpstreamError(err.to_string()),
        };
        let _ = events.send(event).await;
    }
    if !closed {
        let _ = events.send(RelayEvent::UpstreamEnded).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplex::pair::UpstreamState;
    use axum::extract::ws;
    use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
    use tokio_tungstenite::tungstenite;

    type ClientSink = UnboundedSender<ws::Message>;
    type UpstreamSink = UnboundedSender<tungstenite::Message>;
    type TestActor = PairActor<ClientSink, ws::Message, UpstreamSink, tungstenite::Message>;

    fn text(s: &str) -> Frame {
        Frame::Text(s.to_string())
    }

    fn drain<T>(mut rx: UnboundedReceiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(Some(item)) = rx.try_next() {
            out.push(item);
        }
        out
    }

    async fn run(events: Vec<RelayEvent<UpstreamSink>>, client: ClientSink) -> RelayPair {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        TestActor::new(Uuid::new_v4(), client).run(rx).await
    }

    #[tokio::test]
    async fn early_messages_reach_upstream_first_and_in_order() {
        let (client_tx, _client_rx) = unbounded();
        let (up_tx, up_rx) = unbounded();

        run(
            vec![
                RelayEvent::ClientFrame(text("one")),
                RelayEvent::ClientFrame(text("two")),
                RelayEvent::UpstreamOpen(up_tx),
                RelayEvent::ClientFrame(text("three")),
            ],
            client_tx,
        )
        .await;

        let sent: Vec<_> = drain(up_rx).into_iter().map(|m| m.classify()).collect();
        assert_eq!(
            sent,
            vec![
                Inbound::Frame(text("one")),
                Inbound::Frame(text("two")),
                Inbound::Frame(text("three")),
            ]
        );
    }

    #[tokio::test]
    async fn client_close_reaches_upstream_with_code_and_reason() {
        let (client_tx, client_rx) = unbounded();
        let (up_tx, up_rx) = unbounded();

        let pair = run(
            vec![
                RelayEvent::UpstreamOpen(up_tx),
                RelayEvent::ClientClosed(CloseInfo::new(1000, "bye")),
                RelayEvent::UpstreamFrame(text("too late")),
                RelayEvent::UpstreamClosed(CloseInfo::new(1000, "bye")),
            ],
            client_tx,
        )
        .await;

        assert!(pair.is_finished());
        let sent: Vec<_> = drain(up_rx).into_iter().map(|m| m.classify()).collect();
        assert_eq!(sent, vec![Inbound::Close(CloseInfo::new(1000, "bye"))]);
        assert!(drain(client_rx).is_empty());
    }

    #[tokio::test]
    async fn upstream_close_reaches_client_with_code_and_reason() {
        let (client_tx, client_rx) = unbounded();
        let (up_tx, up_rx) = unbounded();

        let pair = run(
            vec![
                RelayEvent::UpstreamOpen(up_tx),
                RelayEvent::UpstreamFrame(text("hello")),
                RelayEvent::UpstreamClosed(CloseInfo::new(1000, "bye")),
                RelayEvent::ClientClosed(CloseInfo::new(1000, "bye")),
            ],
            client_tx,
        )
        .await;

        assert!(pair.is_finished());
        let received: Vec<_> = drain(client_rx).into_iter().map(|m| m.classify()).collect();
        assert_eq!(
            received,
            vec![
                Inbound::Frame(text("hello")),
                Inbound::Close(CloseInfo::new(1000, "bye")),
            ]
        );
        assert!(drain(up_rx).is_empty());
    }

    #[tokio::test]
    async fn upstream_errors_do_not_close_the_client() {
        let (client_tx, client_rx) = unbounded();
        let (up_tx, _up_rx) = unbounded();

        let pair = run(
            vec![
                RelayEvent::UpstreamOpen(up_tx),
                RelayEvent::UpstreamError("connection reset".into()),
                RelayEvent::UpstreamEnded,
            ],
            client_tx,
        )
        .await;

        assert!(pair.is_client_open());
        assert_eq!(pair.upstream_state(), UpstreamState::Closed);
        assert!(drain(client_rx).is_empty());
    }

    #[tokio::test]
    async fn failed_connect_drops_queue_and_keeps_client() {
        let (client_tx, client_rx) = unbounded();

        let pair = run(
            vec![
                RelayEvent::ClientFrame(text("queued")),
                RelayEvent::UpstreamFailed("dns error".into()),
                RelayEvent::ClientFrame(text("after")),
            ],
            client_tx,
        )
        .await;

        assert_eq!(pair.pending_len(), 0);
        assert!(pair.is_client_open());
        assert!(drain(client_rx).is_empty());
    }

    #[tokio::test]
    async fn late_upstream_connection_is_closed() {
        let (client_tx, _client_rx) = unbounded();
        let (up_tx, up_rx) = unbounded::<tungstenite::Message>();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tx.send(RelayEvent::ClientClosed(CloseInfo::new(1001, "away")))
            .await
            .unwrap();
        tx.send(RelayEvent::UpstreamOpen(up_tx)).await.unwrap();
        drop(tx);

        let pair = TestActor::new(Uuid::new_v4(), client_tx).run(rx).await;
        assert!(pair.is_finished());
        // the actor stopped after the client close; the late sink was never used
        assert!(drain(up_rx).is_empty());
    }

    #[tokio::test]
    async fn pumps_drain_the_socket_after_a_close() {
        let (tx, mut rx) = mpsc::channel::<RelayEvent<UpstreamSink>>(EVENT_CHANNEL_CAPACITY);
        let mut messages = futures::stream::iter(vec![
            Ok::<_, String>(ws::Message::Close(None)),
            Ok(ws::Message::Text("after close".into())),
        ]);
        pump_client(&mut messages, tx).await;

        assert!(messages.next().await.is_none());
        assert!(matches!(
            rx.recv().await,
            Some(RelayEvent::ClientClosed(c)) if c == CloseInfo::no_status()
        ));
        assert!(rx.recv().await.is_none());

        let (tx, mut rx) = mpsc::channel::<RelayEvent<UpstreamSink>>(EVENT_CHANNEL_CAPACITY);
        let mut messages = futures::stream::iter(vec![
            Ok::<_, String>(tungstenite::Message::Close(None)),
            Err("reset".to_string()),
            Ok(tungstenite::Message::Text("after close".into())),
        ]);
        pump_upstream(&mut messages, tx).await;

        assert!(messages.next().await.is_none());
        assert!(matches!(rx.recv().await, Some(RelayEvent::UpstreamClosed(_))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn pumps_keep_reading_once_the_actor_is_gone() {
        let (tx, rx) = mpsc::channel::<RelayEvent<UpstreamSink>>(EVENT_CHANNEL_CAPACITY);
        drop(rx);
        let mut messages = futures::stream::iter(vec![
            Ok::<_, String>(ws::Message::Text("one".into())),
            Ok(ws::Message::Close(None)),
        ]);
        pump_client(&mut messages, tx).await;
        assert!(messages.next().await.is_none());
    }

    #[tokio::test]
    async fn pumps_translate_socket_traffic() {
        let (tx, mut rx) = mpsc::channel::<RelayEvent<UpstreamSink>>(EVENT_CHANNEL_CAPACITY);
        let messages = futures::stream::iter(vec![
            Ok::<_, String>(ws::Message::Text("hi".into())),
            Ok(ws::Message::Ping(bytes::Bytes::new())),
            Err("reset".to_string()),
        ]);
        pump_client(messages, tx).await;

        assert!(matches!(rx.recv().await, Some(RelayEvent::ClientFrame(Frame::Text(t))) if t == "hi"));
        assert!(matches!(
            rx.recv().await,
            Some(RelayEvent::ClientClosed(c)) if c == CloseInfo::no_status()
        ));
        assert!(rx.recv().await.is_none());

        let (tx, mut rx) = mpsc::channel::<RelayEvent<UpstreamSink>>(EVENT_CHANNEL_CAPACITY);
        let messages = futures::stream::iter(vec![
            Err::<tungstenite::Message, _>("tls alert".to_string()),
            Ok(tungstenite::Message::Close(None)),
        ]);
        pump_upstream(messages, tx).await;

        assert!(matches!(rx.recv().await, Some(RelayEvent::UpstreamError(e)) if e == "tls alert"));
        assert!(matches!(
            rx.recv().await,
            Some(RelayEvent::UpstreamClosed(c)) if c == CloseInfo::no_status()
        ));
        assert!(rx.recv().await.is_none());
    }
}
