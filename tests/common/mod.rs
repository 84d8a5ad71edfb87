//! Shared utilities for integration tests: a scriptable socket server and a
//! programmable HTTP backend.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

use media_transport::config::ClientConfig;
use media_transport::protocol::Envelope;
use media_transport::transport::TransportSelector;
use media_transport::FallbackTransport;

enum ServerCommand {
    Push(String),
    Raw(String),
    Drop,
}

/// Socket server that records every envelope a client sends and lets the
/// test push envelopes back over the most recent connection.
pub struct MockSocketServer {
    pub addr: SocketAddr,
    received: mpsc::UnboundedReceiver<Envelope>,
    current: Arc<Mutex<Option<mpsc::UnboundedSender<ServerCommand>>>>,
    accepted: Arc<AtomicUsize>,
    ended: Arc<AtomicUsize>,
}

impl MockSocketServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let current = Arc::new(Mutex::new(None));
        let accepted = Arc::new(AtomicUsize::new(0));
        let ended = Arc::new(AtomicUsize::new(0));

        let slot = current.clone();
        let count = accepted.clone();
        let finished = ended.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(socket).await else {
                    continue;
                };
                let (control_tx, mut control_rx) = mpsc::unbounded_channel();
                *slot.lock().unwrap() = Some(control_tx);
                count.fetch_add(1, Ordering::SeqCst);

                let received_tx = received_tx.clone();
                let finished = finished.clone();
                tokio::spawn(async move {
                    let (mut sink, mut stream) = ws.split();
                    loop {
                        tokio::select! {
                            frame = stream.next() => match frame {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(envelope) = Envelope::decode(text.as_str()) {
                                        let _ = received_tx.send(envelope);
                                    }
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            command = control_rx.recv() => match command {
                                Some(ServerCommand::Push(text)) | Some(ServerCommand::Raw(text)) => {
                                    if sink.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Some(ServerCommand::Drop) | None => {
                                    let _ = sink.close().await;
                                    break;
                                }
                            },
                        }
                    }
                    finished.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self {
            addr,
            received,
            current,
            accepted,
            ended,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/events", self.addr)
    }

    /// Next envelope sent by the client. Panics after five seconds.
    pub async fn next_envelope(&mut self) -> Envelope {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("timed out waiting for client envelope")
            .expect("server stopped")
    }

    /// Envelopes already received, without waiting.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.received.try_recv() {
            out.push(envelope);
        }
        out
    }

    /// Send an envelope to the client on the latest connection.
    pub fn push(&self, envelope: Envelope) {
        self.command(ServerCommand::Push(envelope.encode().unwrap()));
    }

    /// Send an arbitrary text frame to the client.
    pub fn push_raw(&self, text: &str) {
        self.command(ServerCommand::Raw(text.to_string()));
    }

    /// Close the latest connection from the server side.
    pub fn drop_connection(&self) {
        self.command(ServerCommand::Drop);
    }

    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Wait until `n` connections have been accepted.
    pub async fn wait_connections(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.connections() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client never connected");
    }

    /// Wait until `n` connections have ended, from either side.
    pub async fn wait_ended(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.ended.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection never ended");
    }

    fn command(&self, command: ServerCommand) {
        let current = self.current.lock().unwrap();
        current
            .as_ref()
            .expect("no client connected")
            .send(command)
            .unwrap_or_else(|_| panic!("client connection already gone"));
    }
}

/// Client configuration pointed at the given socket and HTTP endpoints,
/// preferring the socket.
pub fn socket_config(socket_url: &str, http_base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.endpoint.socket_url = socket_url.to_string();
    config.endpoint.http_base_url = http_base_url.to_string();
    config.transport.prefer_fallback = false;
    config.reconnect.base_delay_ms = 50;
    config.reconnect.max_delay_ms = 200;
    config
}

/// Wait until the selector's current connection is Open.
pub async fn wait_socket_open<F: FallbackTransport>(selector: &TransportSelector<F>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(connection) = selector.connection() {
                if connection.is_open() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("socket never opened");
}

/// Start a programmable HTTP backend on an ephemeral port.
///
/// The handler receives the request line (`"GET /path"`) and returns a
/// status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let head = String::from_utf8_lossy(&buf[..n]);
                        let request_line = head
                            .lines()
                            .next()
                            .unwrap_or_default()
                            .rsplit_once(' ')
                            .map(|(line, _version)| line.to_string())
                            .unwrap_or_default();

                        let (status, body) = f(request_line).await;
                        let status_text = match status {
                            200 => "200 OK",
                            201 => "201 Created",
                            204 => "204 No Content",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Selector with a proxy-free HTTP fallback, as integration tests need.
pub fn build_selector(config: &ClientConfig) -> Arc<TransportSelector<media_transport::HttpFallback>> {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let fallback = media_transport::HttpFallback::with_client(client, &config.endpoint.http_base_url);
    Arc::new(TransportSelector::new(config, fallback))
}
