//! Loki API client: readiness probing, historical range pagination, and
//! WebSocket tailing.
//!
//! The client is immutable after construction; all mutation happens inside
//! the background tasks it spawns. Every long-running operation observes a
//! caller-supplied cancellation token and shuts down in bounded time.

pub mod range;
pub mod tail;
pub mod types;
pub mod url;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LokiSourceConfig;
use self::url::READY_ENDPOINT;

/// Identifies the product on every HTTP request and WebSocket upgrade.
pub(crate) const PRODUCT_USER_AGENT: &str = concat!("logtide ", env!("CARGO_PKG_VERSION"));

/// Cadence of the readiness probe.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("bad HTTP response code: {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("failed to decode Loki response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("timed out after {timeout:?}: {last_error}")]
    ReadyDeadline { timeout: Duration, last_error: String },

    #[error("cancelled")]
    Cancelled,

    #[error("error dialing WS {url}: {reason}")]
    Dial { url: String, reason: String },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid header value for {0}")]
    InvalidHeader(String),
}

/// Connection settings the client needs; derived from the resolved source
/// configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub prefix: String,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub limit: usize,
    pub since: Duration,
    pub delay_for: Duration,
}

impl From<&LokiSourceConfig> for ClientConfig {
    fn from(config: &LokiSourceConfig) -> Self {
        Self {
            url: config.url.clone(),
            prefix: config.prefix.clone(),
            query: config.query.clone(),
            headers: config.headers.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            limit: config.limit,
            since: config.since,
            delay_for: config.delay_for,
        }
    }
}

/// Client facade over the Loki HTTP and WebSocket endpoints.
#[derive(Debug, Clone)]
pub struct LokiClient {
    pub(crate) config: ClientConfig,
    pub(crate) http: reqwest::Client,
    pub(crate) headers: HeaderMap,
}

impl LokiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ClientError::InvalidHeader(name.to_string()))?;
            headers.insert(name, value);
        }
        headers.insert(USER_AGENT, HeaderValue::from_static(PRODUCT_USER_AGENT));

        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            config,
            http,
            headers,
        })
    }

    /// Builds the URL for `endpoint` under the configured base and prefix.
    pub(crate) fn url_for(&self, endpoint: &str, params: &[(&str, String)]) -> String {
        self::url::build_url(&self.config.url, &self.config.prefix, endpoint, params)
    }

    /// Polls `/ready` until Loki answers 200, `deadline` expires, or `cancel`
    /// fires. Probe failures are logged and retried; the deadline error wraps
    /// the last failure observed so transport problems surface to the caller.
    pub async fn ready(
        &self,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let url = self.url_for(READY_ENDPOINT, &[]);
        let last_error = Mutex::new(String::from("readiness probe never completed"));

        let probe = async {
            let mut interval = tokio::time::interval(READY_POLL_INTERVAL);
            loop {
                interval.tick().await;
                debug!(url = %url, "checking if loki is ready");
                match self
                    .http
                    .get(&url)
                    .headers(self.headers.clone())
                    .send()
                    .await
                {
                    Ok(resp) => {
                        let status = resp.status();
                        // Dispose of the body on every iteration.
                        let _ = resp.bytes().await;
                        if status == StatusCode::OK {
                            info!("loki is ready");
                            return;
                        }
                        debug!(status = %status, "loki is not ready");
                        *last_error.lock().unwrap() = format!("unexpected status {status}");
                    }
                    Err(err) => {
                        warn!(error = %err, "error checking if loki is ready");
                        *last_error.lock().unwrap() = error_chain(&err);
                    }
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            _ = tokio::time::sleep(deadline) => Err(ClientError::ReadyDeadline {
                timeout: deadline,
                last_error: last_error.lock().unwrap().clone(),
            }),
            _ = probe => Ok(()),
        }
    }
}

/// Flattens an error and its sources into one line, so transport causes
/// ("connection refused" and friends) survive into wrapped error text.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(url: &str) -> ClientConfig {
        ClientConfig {
            url: url.to_string(),
            prefix: "/".to_string(),
            query: r#"{server="demo"}"#.to_string(),
            headers: HashMap::new(),
            username: None,
            password: None,
            limit: 100,
            since: Duration::ZERO,
            delay_for: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn ready_deadline_reports_last_probe_error() {
        // Nothing listens on this port.
        let client = LokiClient::new(test_config("http://127.0.0.1:3101")).unwrap();
        let cancel = CancellationToken::new();

        let err = client
            .ready(Duration::from_millis(1200), &cancel)
            .await
            .expect_err("no server should be reachable");

        match err {
            ClientError::ReadyDeadline { last_error, .. } => {
                assert!(
                    !last_error.contains("never completed"),
                    "probe error should have been recorded: {last_error}"
                );
            }
            other => panic!("expected ReadyDeadline, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ready_observes_cancellation() {
        let client = LokiClient::new(test_config("http://127.0.0.1:3101")).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .ready(Duration::from_secs(10), &cancel)
            .await
            .expect_err("cancelled before first probe");
        assert!(matches!(err, ClientError::Cancelled));
    }

    #[test]
    fn rejects_malformed_custom_headers() {
        let mut config = test_config("http://127.0.0.1:3100");
        config
            .headers
            .insert("X-Scope-OrgID".to_string(), "tenant-1".to_string());
        assert!(LokiClient::new(config).is_ok());

        let mut config = test_config("http://127.0.0.1:3100");
        config
            .headers
            .insert("bad header name".to_string(), "x".to_string());
        assert!(LokiClient::new(config).is_err());
    }
}
