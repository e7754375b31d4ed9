//! WebSocket tail session against `loki/api/v1/tail`.
//!
//! Dialing happens in the caller's task so handshake errors surface
//! immediately (with the HTTP response body when the server sent one). The
//! receive loop runs in a background task that forwards decoded frames on a
//! bounded channel and selects on the cancellation token, so shutdown is
//! bounded even when the remote goes silent: the socket is closed explicitly
//! rather than waiting for a read to complete.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as WsRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName as WsHeaderName, HeaderValue as WsHeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::types::TailResponse;
use super::url::TAIL_ENDPOINT;
use super::{ClientError, LokiClient, PRODUCT_USER_AGENT};

/// One in-flight frame; a stalled consumer stalls the socket read.
const FRAME_CHANNEL_CAPACITY: usize = 1;

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

impl LokiClient {
    /// Dials the tail endpoint and spawns the receive loop.
    ///
    /// Returns the frame channel and the reader handle. The channel closes
    /// when the reader stops; the handle carries the read error, if any.
    /// Cancellation closes the WebSocket and resolves the handle with `Ok`.
    pub async fn tail(
        &self,
        cancel: CancellationToken,
    ) -> Result<
        (
            mpsc::Receiver<TailResponse>,
            JoinHandle<Result<(), ClientError>>,
        ),
        ClientError,
    > {
        let start = Utc::now()
            - chrono::Duration::from_std(self.config.since)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let url = self.url_for(
            TAIL_ENDPOINT,
            &[
                ("query", self.config.query.clone()),
                ("limit", self.config.limit.to_string()),
                (
                    "start",
                    start.timestamp_nanos_opt().unwrap_or_default().to_string(),
                ),
            ],
        );

        let request = self.websocket_request(&url)?;
        info!(url = %url, "connecting to loki tail");
        let connection = match connect_async(request).await {
            Ok((connection, _response)) => connection,
            Err(WsError::Http(response)) => {
                let status = response.status();
                let body = response
                    .into_body()
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .unwrap_or_default();
                return Err(ClientError::Dial {
                    url,
                    reason: format!("HTTP {status}: {body}"),
                });
            }
            Err(err) => {
                return Err(ClientError::Dial {
                    url,
                    reason: err.to_string(),
                });
            }
        };

        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let handle = tokio::spawn(run_tail(connection, tx, cancel));
        Ok((rx, handle))
    }

    /// Builds the upgrade request: configured headers, product user-agent,
    /// and Basic credentials as an explicit `Authorization` header.
    fn websocket_request(&self, url: &str) -> Result<WsRequest, ClientError> {
        let mut request = url.into_client_request().map_err(|err| ClientError::Dial {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

        let headers = request.headers_mut();
        for (name, value) in &self.headers {
            let name = WsHeaderName::from_bytes(name.as_str().as_bytes())
                .map_err(|_| ClientError::InvalidHeader(name.to_string()))?;
            let value = WsHeaderValue::from_bytes(value.as_bytes())
                .map_err(|_| ClientError::InvalidHeader(name.to_string()))?;
            headers.insert(name, value);
        }
        headers.insert(
            "User-Agent",
            WsHeaderValue::from_static(PRODUCT_USER_AGENT),
        );

        if self.config.username.is_some() || self.config.password.is_some() {
            let credentials = format!(
                "{}:{}",
                self.config.username.as_deref().unwrap_or_default(),
                self.config.password.as_deref().unwrap_or_default()
            );
            let value = format!("Basic {}", BASE64.encode(credentials));
            headers.insert(
                "Authorization",
                WsHeaderValue::from_str(&value)
                    .map_err(|_| ClientError::InvalidHeader("Authorization".to_string()))?,
            );
        }

        Ok(request)
    }
}

async fn run_tail(
    mut connection: WsConnection,
    tx: mpsc::Sender<TailResponse>,
    cancel: CancellationToken,
) -> Result<(), ClientError> {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("closing tail websocket");
                let _ = connection.close(None).await;
                return Ok(());
            }
            frame = connection.next() => frame,
        };

        let message = match frame {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                error!(error = %err, "error reading from tail websocket");
                return Err(err.into());
            }
            None => return Err(ClientError::WebSocket(WsError::ConnectionClosed)),
        };

        let response: TailResponse = match message {
            Message::Text(text) => serde_json::from_str(&text)?,
            Message::Binary(bytes) => serde_json::from_slice(&bytes)?,
            Message::Close(_) => return Err(ClientError::WebSocket(WsError::ConnectionClosed)),
            // Pings are answered by tungstenite while reading.
            _ => continue,
        };
        trace!(streams = response.streams.len(), "read tail frame");

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("closing tail websocket");
                let _ = connection.close(None).await;
                return Ok(());
            }
            sent = tx.send(response) => {
                if sent.is_err() {
                    // Consumer went away; treated like cancellation.
                    let _ = connection.close(None).await;
                    return Ok(());
                }
            }
        }
    }
}
