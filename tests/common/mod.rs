//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    handshake::server::{ErrorResponse, Request, Response},
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message,
};

use origin_relay::config::RelayConfig;
use origin_relay::http::HttpServer;
use origin_relay::lifecycle::Shutdown;

/// A request as the upstream saw it on the wire.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// First value of a header, name matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_count(&self, name: &str) -> usize {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .count()
    }
}

/// Bind a listener on an ephemeral local port.
pub async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Serve a fixed raw HTTP/1.1 response to every connection and record what
/// each request looked like.
pub fn serve_raw(listener: TcpListener, response: Vec<u8>) -> mpsc::UnboundedReceiver<RecordedRequest> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            let response = response.clone();
            tokio::spawn(async move {
                if let Some(recorded) = read_request(&mut socket).await {
                    let _ = tx.send(recorded);
                }
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    rx
}

/// A complete raw response that closes the connection afterwards.
pub fn raw_response(status_line: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut head = format!("HTTP/1.1 {}\r\n", status_line);
    for (name, value) in headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", body.len()));

    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        request_line,
        headers,
        body,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// What the mock WebSocket upstream observed.
#[derive(Debug)]
pub enum UpstreamSeen {
    Path(String),
    Message(Message),
}

/// WebSocket upstream that waits `accept_delay` before completing the
/// handshake, then:
/// - answers `please-close` with close 4000 "gone"
/// - echoes other text as `echo:<text>` and binary unchanged
pub async fn start_ws_upstream(
    accept_delay: Duration,
) -> (SocketAddr, mpsc::UnboundedReceiver<UpstreamSeen>) {
    let (listener, addr) = bind().await;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(accept_delay).await;

                let path_tx = tx.clone();
                let callback = move |request: &Request, response: Response| {
                    let path = request
                        .uri()
                        .path_and_query()
                        .map(|pq| pq.to_string())
                        .unwrap_or_default();
                    let _ = path_tx.send(UpstreamSeen::Path(path));
                    Ok::<Response, ErrorResponse>(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, callback).await else {
                    return;
                };

                while let Some(Ok(message)) = ws.next().await {
                    let _ = tx.send(UpstreamSeen::Message(message.clone()));
                    let reply = match message {
                        Message::Text(text) if text.as_str() == "please-close" => {
                            Message::Close(Some(CloseFrame {
                                code: CloseCode::from(4000),
                                reason: "gone".into(),
                            }))
                        }
                        Message::Text(text) => Message::Text(format!("echo:{}", text.as_str()).into()),
                        Message::Binary(data) => Message::Binary(data),
                        _ => continue,
                    };
                    if ws.send(reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (addr, rx)
}

/// Configuration pointing at a local plain-HTTP upstream.
pub fn relay_config(upstream: SocketAddr) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.origin = format!("http://{}", upstream);
    config.upstream.public_domain = "relay.example".into();
    config.session.cookie = Some("sso=abc".into());
    config
}

/// Start the relay on an ephemeral port. Keep the returned [`Shutdown`]
/// alive for as long as the relay should run.
pub async fn start_relay(config: RelayConfig) -> (SocketAddr, Shutdown) {
    let (listener, addr) = bind().await;
    let server = HttpServer::new(config).unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });
    (addr, shutdown)
}

/// HTTP client that neither follows redirects nor uses a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// Next observation from the mock upstream, or panic after a while.
pub async fn next_seen<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for upstream")
        .expect("upstream channel closed")
}
