//! The classification table: configuration data, not scattered conditionals.

/// Event type that marks successful completion of a chunk's ingest.
pub const INGEST_COMPLETE: &str = "ingest.complete";

/// How occurrences of an event type map to progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventClass {
    /// Happens once per chunk.
    SingleShot,
    /// One occurrence per file in the chunk.
    PerFile,
    /// One occurrence per unit, manifestation, or file in the chunk.
    PerEntity,
}

/// Known progress event types and their classes.
///
/// Types absent from this table are ignored by the classifier. The failure
/// rule (any type containing `fail`) and [`INGEST_COMPLETE`] are fixed
/// semantics and deliberately not table entries.
pub const EVENT_TABLE: &[(&str, EventClass)] = &[
    ("manifest.digest", EventClass::SingleShot),
    ("package.unpack", EventClass::SingleShot),
    ("virus.scan", EventClass::PerFile),
    ("fixity.compute", EventClass::PerFile),
    ("bitstream.store", EventClass::PerFile),
    ("object.register", EventClass::PerEntity),
    ("metadata.index", EventClass::PerEntity),
];

/// Look up the class of an event type.
#[must_use]
pub fn classify(event_type: &str) -> Option<EventClass> {
    EVENT_TABLE
        .iter()
        .find(|(known, _)| *known == event_type)
        .map(|(_, class)| *class)
}
