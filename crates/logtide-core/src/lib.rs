//! Public entry points for the logtide core crate.
//!
//! This crate defines the boundary between acquisition sources and the rest
//! of the agent: the event model handed to the processing pipeline, the
//! `DataSource` contract every source implements, and the shared error
//! taxonomy for framework-facing calls.

pub mod error;
pub mod event;
pub mod source;

pub use error::SourceError;
pub use event::{Event, EventKind, ExpectMode, Line};
pub use source::{DataSource, Mode};
