//! Remote status polling and classification.
//!
//! The module is organised around the [`ChunkClassifier`] state machine: it
//! polls a status handle through the injected [`Clock`], classifies each raw
//! [`StatusEvent`] against the const [`EVENT_TABLE`], and drives the chunk to
//! a terminal [`ChunkOutcome`] while emitting provenance records along the
//! way.

pub mod classifier;
pub mod clock;
pub mod event;
pub mod table;

pub use classifier::{
    ChunkClassifier, ChunkContext, ChunkOutcome, ChunkPhase, ClassifierError, PollConfig,
    SINGLE_SHOT_PERCENT,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::StatusEvent;
pub use table::{classify, EventClass, EVENT_TABLE, INGEST_COMPLETE};
