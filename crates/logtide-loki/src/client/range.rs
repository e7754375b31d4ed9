//! Forward pagination over `query_range`.
//!
//! The paginator runs as a background task publishing decoded pages on a
//! bounded channel. A page smaller than the configured limit (or an empty
//! one) ends the run and closes the channel; errors surface through the
//! task's join handle, never through the channel itself.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::types::QueryRangeResponse;
use super::url::QUERY_RANGE_ENDPOINT;
use super::{ClientError, LokiClient};

/// Capacity of the page channel: one in-flight page, so a stalled consumer
/// stalls the network reads instead of growing a queue.
const PAGE_CHANNEL_CAPACITY: usize = 1;

impl LokiClient {
    /// Spawns the range paginator for the configured window.
    ///
    /// Returns the page channel and the paginator handle. The channel closes
    /// when pagination finishes for any reason; the handle distinguishes a
    /// drained window (`Ok`) from an aborted one (`Err`). Cancellation stops
    /// the task and counts as a drained window.
    pub fn query_range(
        &self,
        cancel: CancellationToken,
    ) -> (
        mpsc::Receiver<QueryRangeResponse>,
        JoinHandle<Result<(), ClientError>>,
    ) {
        let (tx, rx) = mpsc::channel(PAGE_CHANNEL_CAPACITY);
        let client = self.clone();
        let handle = tokio::spawn(async move { client.run_query_range(tx, cancel).await });
        (rx, handle)
    }

    async fn run_query_range(
        &self,
        tx: mpsc::Sender<QueryRangeResponse>,
        cancel: CancellationToken,
    ) -> Result<(), ClientError> {
        let mut start = Utc::now()
            - chrono::Duration::from_std(self.config.since).unwrap_or_else(|_| chrono::Duration::zero());

        loop {
            let page = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("range pagination cancelled");
                    return Ok(());
                }
                page = self.fetch_page(start) => page?,
            };

            let result_count = page.data.result.len();
            let first_stream_len = page
                .data
                .result
                .first()
                .map(|stream| stream.values.len())
                .unwrap_or(0);
            let max_timestamp = page
                .data
                .result
                .iter()
                .filter_map(|stream| stream.values.last())
                .map(|entry| entry.timestamp)
                .max();

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("range pagination cancelled");
                    return Ok(());
                }
                sent = tx.send(page) => {
                    if sent.is_err() {
                        // Consumer went away; treated like cancellation.
                        debug!("range page channel closed by consumer");
                        return Ok(());
                    }
                }
            }

            if result_count == 0 || first_stream_len < self.config.limit {
                info!(
                    entries = first_stream_len,
                    limit = self.config.limit,
                    "got less than limit results, stopping"
                );
                return Ok(());
            }

            match max_timestamp {
                Some(ts) => {
                    debug!(entries = first_stream_len, last_timestamp = %ts, "advancing range window");
                    start = ts;
                }
                // A full first stream guarantees at least one entry; keep the
                // window in place if the server sent something degenerate.
                None => return Ok(()),
            }
        }
    }

    async fn fetch_page(&self, start: DateTime<Utc>) -> Result<QueryRangeResponse, ClientError> {
        let end = Utc::now()
            - chrono::Duration::from_std(self.config.delay_for)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let url = self.url_for(
            QUERY_RANGE_ENDPOINT,
            &[
                ("query", self.config.query.clone()),
                (
                    "start",
                    start.timestamp_nanos_opt().unwrap_or_default().to_string(),
                ),
                (
                    "end",
                    end.timestamp_nanos_opt().unwrap_or_default().to_string(),
                ),
                ("limit", self.config.limit.to_string()),
                ("direction", "forward".to_string()),
            ],
        );

        debug!(url = %url, "querying loki range");
        let mut request = self.http.get(&url).headers(self.headers.clone());
        if self.config.username.is_some() || self.config.password.is_some() {
            request = request.basic_auth(
                self.config.username.as_deref().unwrap_or_default(),
                self.config.password.as_deref(),
            );
        }

        let response = request.send().await?;
        let status = response.status();
        // Always drain the body, success or not.
        let body = response.bytes().await?;

        if status != StatusCode::OK {
            return Err(ClientError::BadStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}
