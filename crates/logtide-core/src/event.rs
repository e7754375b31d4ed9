//! Event model shared between acquisition sources and the processing
//! pipeline.
//!
//! A source produces one [`Event`] per acquired log line. Events are moved
//! into the output channel and never touched by the source again; ownership
//! transfers to the consumer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single acquired log line plus its acquisition context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    /// Raw line text exactly as the backend delivered it.
    pub raw: String,
    /// Timestamp carried by the line (nanosecond precision where the backend
    /// provides it).
    pub time: DateTime<Utc>,
    /// Where the line came from (URL, path, ...), for diagnostics.
    pub src: String,
    /// Static labels attached by the source configuration.
    pub labels: HashMap<String, String>,
    /// Whether downstream stages should process this line.
    pub process: bool,
    /// Name of the source module that produced the line.
    pub module: String,
}

/// What kind of payload an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A log line acquired from a source.
    Log,
}

/// How the pipeline should treat the event's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectMode {
    /// The event is happening now; pipeline clocks apply.
    Live,
    /// The event carries its own timestamp; replay it at that instant.
    Timemachine,
}

/// Unit handed to the processing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub line: Line,
    pub process: bool,
    pub kind: EventKind,
    pub expect_mode: ExpectMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_lowercase_discriminants() {
        let event = Event {
            line: Line {
                raw: "hello".into(),
                time: Utc::now(),
                src: "http://127.0.0.1:3100".into(),
                labels: HashMap::new(),
                process: true,
                module: "loki".into(),
            },
            process: true,
            kind: EventKind::Log,
            expect_mode: ExpectMode::Timemachine,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "log");
        assert_eq!(json["expect_mode"], "timemachine");
        assert_eq!(json["line"]["module"], "loki");
    }
}
