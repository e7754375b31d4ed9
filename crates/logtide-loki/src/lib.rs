//! Grafana Loki acquisition source.
//!
//! Ingests log entries from a Loki backend and hands them to the processing
//! pipeline as [`logtide_core::Event`]s, either by tailing new entries over a
//! WebSocket or by replaying a historical window through paginated
//! `query_range` calls.
//!
//! The crate splits into three layers: [`config`] resolves and validates the
//! two configuration forms, [`client`] speaks the Loki API, and [`source`]
//! drives acquisitions against the framework contract.

pub mod client;
pub mod config;
pub mod metrics;
pub mod source;

pub use client::types::{
    DroppedEntry, Entry, QueryRangeData, QueryRangeResponse, Stream, TailResponse,
};
pub use client::{ClientConfig, ClientError, LokiClient};
pub use config::{resolve_dsn, resolve_yaml, ConfigError, LokiSourceConfig};
pub use source::{LokiSource, SOURCE_NAME};
