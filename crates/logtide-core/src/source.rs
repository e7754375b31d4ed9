//! Contract between the acquisition framework and individual data sources.
//!
//! The framework instantiates a source, configures it exactly once (from a
//! structured document or a DSN), then drives it in one of two modes:
//! one-shot replay of a bounded window, or streaming until shutdown. The
//! shutdown token is the owner-level signal; sources derive per-invocation
//! tokens from it for their internal tasks.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;
use crate::event::Event;

/// Operating mode of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Follow new entries indefinitely.
    Tail,
    /// Replay a historical window, then stop.
    Cat,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Tail => write!(f, "tail"),
            Mode::Cat => write!(f, "cat"),
        }
    }
}

/// A log-acquisition source.
///
/// Configuration happens exactly once, before any acquisition call; both
/// acquisition methods run until end-of-data, error, or cancellation of the
/// supplied shutdown token. Cancellation is not an error: a shut-down
/// acquisition returns `Ok(())`.
#[async_trait]
pub trait DataSource: Send {
    /// Configures the source from a structured (YAML) document.
    fn configure(&mut self, config: &[u8]) -> Result<(), SourceError>;

    /// Configures the source from a connection string, attaching `labels` to
    /// every produced event. DSN-configured sources run in one-shot mode.
    fn configure_by_dsn(
        &mut self,
        dsn: &str,
        labels: HashMap<String, String>,
    ) -> Result<(), SourceError>;

    /// Replays the configured window, publishing one event per entry on
    /// `out`, and returns when the window is drained or `shutdown` fires.
    async fn one_shot_acquisition(
        &mut self,
        out: mpsc::Sender<Event>,
        shutdown: CancellationToken,
    ) -> Result<(), SourceError>;

    /// Follows new entries until `shutdown` fires, publishing one event per
    /// entry on `out`.
    async fn streaming_acquisition(
        &mut self,
        out: mpsc::Sender<Event>,
        shutdown: CancellationToken,
    ) -> Result<(), SourceError>;

    /// Modes this source can run in.
    fn supported_modes(&self) -> &'static [Mode];

    /// Mode the source is currently configured for.
    fn mode(&self) -> Mode;

    /// Stable name of the source module (used in event metadata and metrics).
    fn name(&self) -> &'static str;

    /// Checks whether the source can run in this environment.
    fn can_run(&self) -> Result<(), SourceError>;

    /// Snapshot of the resolved configuration for diagnostics.
    fn dump(&self) -> serde_json::Value;

    /// Prometheus collectors owned by this source, for registry wiring.
    fn metrics(&self) -> Vec<Box<dyn prometheus::core::Collector>> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_serde() {
        assert_eq!(serde_json::to_string(&Mode::Tail).unwrap(), "\"tail\"");
        assert_eq!(serde_json::to_string(&Mode::Cat).unwrap(), "\"cat\"");
        assert_eq!(serde_json::from_str::<Mode>("\"cat\"").unwrap(), Mode::Cat);
    }

    #[test]
    fn mode_displays_lowercase() {
        assert_eq!(Mode::Tail.to_string(), "tail");
        assert_eq!(Mode::Cat.to_string(), "cat");
    }
}
