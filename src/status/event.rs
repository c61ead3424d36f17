use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::table::INGEST_COMPLETE;

/// One raw progress event reported by the remote ingest for a chunk.
///
/// The wire form is `{"type": "...", "timestamp": "..."}`. What an event
/// means for progress is the classifier's business; the event itself only
/// knows the two fixed rules: the completion tag and the failure substring.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "type")]
    event_type: String,
    timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(event_type: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp,
        }
    }

    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether this event marks successful completion of the whole chunk.
    #[must_use]
    pub fn is_completion(&self) -> bool {
        self.event_type == INGEST_COMPLETE
    }

    /// Whether this event reports a remote failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.event_type.contains("fail")
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.event_type, self.timestamp.to_rfc3339())
    }
}
