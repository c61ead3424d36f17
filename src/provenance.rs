//! Provenance recording boundary.
//!
//! Every classified status event becomes a [`ProvenanceRecord`]: a
//! timestamped, percent-annotated history entry tied to a submission and its
//! workflow. The pipeline only ever appends records; reading them back is a
//! reporting concern behind [`ProvenanceRecorder::query`].
//!
//! The real datastore lives outside this crate. [`MemoryRecorder`] is the
//! shipped implementation for tests and demos.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::types::{StatusHandle, SubmissionId, WorkflowId};

/// Where a recorded step stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvenanceStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for ProvenanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One append-only history entry for a submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub submission: SubmissionId,
    pub workflow: WorkflowId,
    pub handle: StatusHandle,
    pub when: DateTime<Utc>,
    pub event_type: String,
    /// Progress of the recorded step, 0 through 100.
    pub percent: u8,
    pub status: ProvenanceStatus,
}

/// Failures raised by a recorder backend.
#[derive(Debug, Error, Diagnostic)]
pub enum ProvenanceError {
    #[error("provenance backend failure: {message}")]
    #[diagnostic(
        code(packferry::provenance::backend),
        help("the recorder's datastore rejected the operation; the run halts so the audit trail stays complete")
    )]
    Backend { message: String },
}

/// External sink for submission history.
///
/// Implementations must keep inserts append-only. The pipeline treats an
/// insert failure as fatal for the run; a silently dropped record would leave
/// a hole in the audit trail.
#[async_trait]
pub trait ProvenanceRecorder: Send + Sync {
    async fn insert(&self, record: ProvenanceRecord) -> Result<(), ProvenanceError>;

    /// Records for `submission` under `workflow`, ordered by timestamp
    /// ascending, optionally limited to entries strictly after `since`.
    async fn query(
        &self,
        submission: &SubmissionId,
        workflow: &WorkflowId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ProvenanceRecord>, ProvenanceError>;
}

/// In-memory recorder for tests and demos.
#[derive(Clone, Default)]
pub struct MemoryRecorder {
    entries: Arc<Mutex<Vec<ProvenanceRecord>>>,
}

impl MemoryRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured records, in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProvenanceRecord> {
        self.entries.lock().unwrap().clone()
    }

    /// Clear all captured records.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[async_trait]
impl ProvenanceRecorder for MemoryRecorder {
    async fn insert(&self, record: ProvenanceRecord) -> Result<(), ProvenanceError> {
        self.entries.lock().unwrap().push(record);
        Ok(())
    }

    async fn query(
        &self,
        submission: &SubmissionId,
        workflow: &WorkflowId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ProvenanceRecord>, ProvenanceError> {
        let mut records: Vec<ProvenanceRecord> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.submission == submission && &r.workflow == workflow)
            .filter(|r| since.is_none_or(|cutoff| r.when > cutoff))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.when);
        Ok(records)
    }
}
