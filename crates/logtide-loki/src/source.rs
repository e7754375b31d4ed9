//! The Loki acquisition driver.
//!
//! `LokiSource` glues the client to the framework's output channel: it waits
//! for backend readiness, drives either the range paginator (one-shot) or the
//! tail streamer (streaming), and converts every Loki entry into one output
//! event. Receiving the shutdown signal is a normal way for an acquisition to
//! end, never an error.

use std::collections::HashMap;

use async_trait::async_trait;
use logtide_core::{DataSource, Event, EventKind, ExpectMode, Line, Mode, SourceError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::types::Entry;
use crate::client::{ClientConfig, ClientError, LokiClient};
use crate::config::{resolve_dsn, resolve_yaml, LokiSourceConfig};
use crate::metrics;

pub const SOURCE_NAME: &str = "loki";

/// Loki data source. Unconfigured until `configure` or `configure_by_dsn`
/// succeeds; afterwards the configuration is frozen.
#[derive(Debug, Default)]
pub struct LokiSource {
    config: Option<LokiSourceConfig>,
    client: Option<LokiClient>,
}

impl LokiSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved configuration, for callers that already configured the source.
    pub fn config(&self) -> Option<&LokiSourceConfig> {
        self.config.as_ref()
    }

    fn install(&mut self, config: LokiSourceConfig) -> Result<(), SourceError> {
        let client = LokiClient::new(ClientConfig::from(&config))
            .map_err(|err| SourceError::Configuration(err.to_string()))?;
        debug!(url = %config.url, mode = %config.mode, since = ?config.since, "loki source configured");
        self.config = Some(config);
        self.client = Some(client);
        Ok(())
    }

    fn configured(&self) -> Result<(&LokiSourceConfig, &LokiClient), SourceError> {
        match (&self.config, &self.client) {
            (Some(config), Some(client)) => Ok((config, client)),
            _ => Err(SourceError::Acquisition(
                "loki source is not configured".to_string(),
            )),
        }
    }

    /// Waits for Loki readiness within the configured deadline. Cancellation
    /// reports as `Ok(false)`: the acquisition should end without error.
    async fn wait_for_ready(
        config: &LokiSourceConfig,
        client: &LokiClient,
        shutdown: &CancellationToken,
    ) -> Result<bool, SourceError> {
        let cancel = shutdown.child_token();
        match client.ready(config.wait_for_ready, &cancel).await {
            Ok(()) => Ok(true),
            Err(ClientError::Cancelled) => Ok(false),
            Err(err) => Err(SourceError::Acquisition(format!("loki is not ready: {err}"))),
        }
    }

    fn build_event(config: &LokiSourceConfig, entry: &Entry) -> Event {
        metrics::LINES_READ
            .with_label_values(&[config.url.as_str()])
            .inc();
        Event {
            line: Line {
                raw: entry.line.clone(),
                time: entry.timestamp,
                src: config.url.clone(),
                labels: config.labels.clone(),
                process: true,
                module: SOURCE_NAME.to_string(),
            },
            process: true,
            kind: EventKind::Log,
            expect_mode: ExpectMode::Timemachine,
        }
    }

    /// Publishes one event per entry; returns `false` when the acquisition
    /// should stop (shutdown fired or the consumer went away).
    async fn publish_entries<'a, I>(
        config: &LokiSourceConfig,
        entries: I,
        out: &mpsc::Sender<Event>,
        shutdown: &CancellationToken,
    ) -> bool
    where
        I: IntoIterator<Item = &'a Entry>,
    {
        for entry in entries {
            let event = Self::build_event(config, entry);
            tokio::select! {
                _ = shutdown.cancelled() => return false,
                sent = out.send(event) => {
                    if sent.is_err() {
                        debug!("event channel closed by consumer");
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[async_trait]
impl DataSource for LokiSource {
    fn configure(&mut self, config: &[u8]) -> Result<(), SourceError> {
        let resolved =
            resolve_yaml(config).map_err(|err| SourceError::Configuration(err.to_string()))?;
        self.install(resolved)
    }

    fn configure_by_dsn(
        &mut self,
        dsn: &str,
        labels: HashMap<String, String>,
    ) -> Result<(), SourceError> {
        let resolved =
            resolve_dsn(dsn, labels).map_err(|err| SourceError::Configuration(err.to_string()))?;
        self.install(resolved)
    }

    async fn one_shot_acquisition(
        &mut self,
        out: mpsc::Sender<Event>,
        shutdown: CancellationToken,
    ) -> Result<(), SourceError> {
        let (config, client) = self.configured()?;
        debug!("loki one shot acquisition");

        if !Self::wait_for_ready(config, client, &shutdown).await? {
            return Ok(());
        }

        let pagination = shutdown.child_token();
        let (mut pages, pager) = client.query_range(pagination.clone());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("loki one shot acquisition stopped");
                    pagination.cancel();
                    return Ok(());
                }
                page = pages.recv() => {
                    let page = match page {
                        Some(page) => page,
                        None => break,
                    };
                    for stream in &page.data.result {
                        if !Self::publish_entries(config, &stream.values, &out, &shutdown).await {
                            pagination.cancel();
                            return Ok(());
                        }
                    }
                }
            }
        }

        // Channel closed: a drained window and an aborted one are told apart
        // by the paginator's result, not by the closure itself.
        match task_outcome(pager).await {
            Ok(()) => {
                info!("loki acquisition done, channel closed");
                Ok(())
            }
            Err(err) => Err(SourceError::Acquisition(format!(
                "error querying range: {err}"
            ))),
        }
    }

    async fn streaming_acquisition(
        &mut self,
        out: mpsc::Sender<Event>,
        shutdown: CancellationToken,
    ) -> Result<(), SourceError> {
        let (config, client) = self.configured()?;

        if !Self::wait_for_ready(config, client, &shutdown).await? {
            return Ok(());
        }

        let session = shutdown.child_token();
        let (mut frames, reader) = client
            .tail(session.clone())
            .await
            .map_err(|err| SourceError::Acquisition(format!("could not start loki tail: {err}")))?;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("loki streaming acquisition stopped");
                    session.cancel();
                    let _ = reader.await;
                    return Ok(());
                }
                frame = frames.recv() => {
                    let frame = match frame {
                        Some(frame) => frame,
                        None => {
                            return match task_outcome(reader).await {
                                Ok(()) => Ok(()),
                                Err(err) => Err(SourceError::Acquisition(format!(
                                    "loki tail error: {err}"
                                ))),
                            };
                        }
                    };
                    if frame.streams.is_empty() && frame.dropped_entries.is_empty() {
                        warn!("got empty response from loki tail");
                        continue;
                    }
                    if !frame.dropped_entries.is_empty() {
                        warn!(
                            count = frame.dropped_entries.len(),
                            "entries dropped from loki response"
                        );
                    }
                    for stream in &frame.streams {
                        if !Self::publish_entries(config, &stream.values, &out, &shutdown).await {
                            session.cancel();
                            let _ = reader.await;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn supported_modes(&self) -> &'static [Mode] {
        &[Mode::Tail, Mode::Cat]
    }

    fn mode(&self) -> Mode {
        self.config
            .as_ref()
            .map(|config| config.mode)
            .unwrap_or(Mode::Tail)
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn can_run(&self) -> Result<(), SourceError> {
        Ok(())
    }

    fn dump(&self) -> serde_json::Value {
        self.config
            .as_ref()
            .and_then(|config| serde_json::to_value(config).ok())
            .unwrap_or(serde_json::Value::Null)
    }

    fn metrics(&self) -> Vec<Box<dyn prometheus::core::Collector>> {
        vec![Box::new(metrics::LINES_READ.clone())]
    }
}

/// Collapses a background task result into the acquisition outcome.
async fn task_outcome(
    handle: tokio::task::JoinHandle<Result<(), ClientError>>,
) -> Result<(), ClientError> {
    match handle.await {
        Ok(result) => result,
        Err(join_err) => {
            warn!(error = %join_err, "loki background task failed");
            Ok(())
        }
    }
}
