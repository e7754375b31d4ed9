//! Wire model for the Loki HTTP and WebSocket APIs.
//!
//! Entries travel as `["<nanoseconds-since-epoch>", "<line>"]` tuples inside
//! labelled streams. The same stream shape is shared by `query_range`
//! responses, tail frames, and the push payload used by the test harness.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// A single log entry: nanosecond timestamp plus line text.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

impl<'de> Deserialize<'de> for Entry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (ts, line): (String, String) = Deserialize::deserialize(deserializer)?;
        let nanos: i64 = ts
            .parse()
            .map_err(|err| de::Error::custom(format!("invalid entry timestamp {ts:?}: {err}")))?;
        Ok(Entry {
            timestamp: Utc.timestamp_nanos(nanos),
            line,
        })
    }
}

impl Serialize for Entry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let nanos = self.timestamp.timestamp_nanos_opt().unwrap_or_default();
        (nanos.to_string(), &self.line).serialize(serializer)
    }
}

/// A labelled sequence of entries. The label set is opaque to the source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stream {
    #[serde(default)]
    pub stream: HashMap<String, String>,
    #[serde(default)]
    pub values: Vec<Entry>,
}

/// Payload of a `query_range` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRangeData {
    #[serde(default)]
    pub result: Vec<Stream>,
}

/// One page of historical entries from `query_range`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRangeResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: QueryRangeData,
}

/// Entry the server dropped from a tail session, reported for diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DroppedEntry {
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub timestamp: String,
}

/// One frame of a tail session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TailResponse {
    #[serde(default)]
    pub streams: Vec<Stream>,
    #[serde(default)]
    pub dropped_entries: Vec<DroppedEntry>,
}
