//! In-process progress notifications for running submissions.
//!
//! The module is organised around a flume-backed [`ProgressBus`] that fans
//! events out to pluggable [`ProgressSink`]s. Progress events are advisory:
//! callers wire a sink to drive a UI or log, and a dropped event never fails
//! an ingest run. Remote status events are a different thing entirely; see
//! [`crate::status`].

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::{ProgressBus, ProgressSender};
pub use event::{ProgressEvent, ProgressScope};
pub use sink::{ChannelSink, MemorySink, ProgressSink, StdOutSink, TracingSink};
