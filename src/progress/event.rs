use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::SubmissionId;

/// What part of a run a progress event describes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProgressScope {
    /// The submission as a whole.
    Run { submission: SubmissionId },
    /// One chunk of the submission.
    Chunk {
        submission: SubmissionId,
        index: usize,
    },
}

impl fmt::Display for ProgressScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run { submission } => write!(f, "{submission}"),
            Self::Chunk { submission, index } => write!(f, "{submission}#{index}"),
        }
    }
}

/// One advisory notification published on the progress bus.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub scope: ProgressScope,
    pub message: String,
    /// Percent complete of the described step, when one applies.
    pub percent: Option<u8>,
    pub at: DateTime<Utc>,
}

impl ProgressEvent {
    /// A run-scoped event.
    pub fn run(submission: SubmissionId, message: impl Into<String>) -> Self {
        Self {
            scope: ProgressScope::Run { submission },
            message: message.into(),
            percent: None,
            at: Utc::now(),
        }
    }

    /// A chunk-scoped event.
    pub fn chunk(submission: SubmissionId, index: usize, message: impl Into<String>) -> Self {
        Self {
            scope: ProgressScope::Chunk { submission, index },
            message: message.into(),
            percent: None,
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent = Some(percent);
        self
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent {
            Some(percent) => write!(f, "[{}] {} ({percent}%)", self.scope, self.message),
            None => write!(f, "[{}] {}", self.scope, self.message),
        }
    }
}
