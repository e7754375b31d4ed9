//! In-process mock Loki for acquisition tests.
//!
//! Serves the two endpoints a streaming acquisition touches on a single
//! port: a plain-HTTP `/ready` probe and the `/loki/api/v1/tail` WebSocket.
//! Frames pushed through [`MockLokiTail::push`] are delivered to the first
//! tail session in order, whether pushed before or after the dial.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use logtide_loki::TailResponse;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Message, Role};
use tokio_tungstenite::WebSocketStream;

pub struct MockLokiTail {
    addr: SocketAddr,
    frames: mpsc::UnboundedSender<TailResponse>,
    upgrade_head: Arc<Mutex<Option<String>>>,
}

impl MockLokiTail {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock loki");
        let addr = listener.local_addr().expect("local addr");

        let (frames, frame_rx) = mpsc::unbounded_channel();
        let frame_rx = Arc::new(Mutex::new(Some(frame_rx)));
        let upgrade_head = Arc::new(Mutex::new(None));

        let head_slot = upgrade_head.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let frame_rx = frame_rx.clone();
                let head_slot = head_slot.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, frame_rx, head_slot).await;
                });
            }
        });

        Self {
            addr,
            frames,
            upgrade_head,
        }
    }

    /// Base URL for the source configuration.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queues a tail frame for delivery.
    pub fn push(&self, response: TailResponse) {
        let _ = self.frames.send(response);
    }

    /// Raw head of the WebSocket upgrade request, once a session connected.
    pub async fn upgrade_head(&self) -> Option<String> {
        self.upgrade_head.lock().await.clone()
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    frame_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<TailResponse>>>>,
    head_slot: Arc<Mutex<Option<String>>>,
) -> std::io::Result<()> {
    // Read the request head; GET requests carry no body.
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&head).into_owned();
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();

    if path.starts_with("/ready") {
        stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\nconnection: close\r\n\r\nready")
            .await?;
        return Ok(());
    }

    if path.starts_with("/loki/api/v1/tail") {
        let key = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("sec-websocket-key")
                    .then(|| value.trim().to_string())
            })
            .unwrap_or_default();
        let accept = derive_accept_key(key.as_bytes());
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             upgrade: websocket\r\n\
             connection: Upgrade\r\n\
             sec-websocket-accept: {accept}\r\n\r\n"
        );
        stream.write_all(response.as_bytes()).await?;
        *head_slot.lock().await = Some(head);

        let mut socket = WebSocketStream::from_raw_socket(stream, Role::Server, None).await;
        let mut frames = match frame_rx.lock().await.take() {
            Some(frames) => frames,
            None => return Ok(()),
        };

        loop {
            tokio::select! {
                frame = frames.recv() => {
                    let Some(frame) = frame else { break };
                    let text = serde_json::to_string(&frame).expect("encode tail frame");
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                message = socket.next() => {
                    match message {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        _ => {}
                    }
                }
            }
        }
    }

    Ok(())
}
