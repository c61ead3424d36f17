//! Durable, append-only record of which chunks of a submission completed.
//!
//! The checkpoint store is what makes a failed run cheap: on restart the
//! runner asks [`CheckpointStore::resume`] where a submission left off and
//! continues with the first chunk that never completed. Records are only
//! ever appended; nothing here mutates or deletes history.
//!
//! Backends: [`FileCheckpointStore`] (the primary plain-text log),
//! [`InMemoryCheckpointStore`] (tests and development), and, behind the
//! `sqlite` feature, [`SqliteCheckpointStore`].

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointStore;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::types::{ChunkFileId, StatusHandle, SubmissionId};

/// Failures raised by a checkpoint backend.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("checkpoint backend failure: {message}")]
    #[diagnostic(
        code(packferry::checkpoint::backend),
        help("the checkpoint store must stay writable; without it a halted run cannot resume")
    )]
    Backend { message: String },

    #[error("corrupt checkpoint record: {record:?}")]
    #[diagnostic(
        code(packferry::checkpoint::corrupt),
        help("the log is append-only plain text; repair or remove the damaged record")
    )]
    Corrupt { record: String },

    #[error("checkpoint log for {submission} is missing chunk {index}")]
    #[diagnostic(
        code(packferry::checkpoint::missing_chunk),
        help("chunks complete in order, so a gap means lost or hand-edited records")
    )]
    MissingChunk {
        submission: SubmissionId,
        index: usize,
    },
}

impl CheckpointError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Where a resumed submission picks up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResumePoint {
    /// Last chunk that completed.
    pub last_completed: ChunkFileId,
    /// Status handles of every completed chunk, in chunk order.
    pub handles: Vec<StatusHandle>,
    /// Total chunks recorded for the submission, when known.
    pub total_chunks: Option<usize>,
}

impl ResumePoint {
    /// Index of the next chunk to submit.
    #[must_use]
    pub fn next_index(&self) -> usize {
        self.last_completed.index() + 1
    }

    /// Whether every recorded chunk already completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total_chunks == Some(self.handles.len())
    }
}

/// Append-only store of chunk completions.
///
/// `append` must be atomic per record, and appending the same chunk twice is
/// harmless; the scan keeps the latest record per chunk. Cross-process
/// locking is the caller's concern: the pipeline assumes one writer per
/// submission.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Durably record that `chunk` completed with `handle`.
    async fn append(
        &self,
        chunk: &ChunkFileId,
        handle: &StatusHandle,
    ) -> Result<(), CheckpointError>;

    /// Record the submission's total chunk count. The first recorded value
    /// wins; later calls leave it untouched.
    async fn record_total_chunks(
        &self,
        submission: &SubmissionId,
        total: usize,
    ) -> Result<(), CheckpointError>;

    /// Where `submission` left off, or `None` when it has no completed
    /// chunks on record.
    async fn resume(
        &self,
        submission: &SubmissionId,
    ) -> Result<Option<ResumePoint>, CheckpointError>;

    /// Every submission the store has chunk records for.
    async fn list_submissions(&self) -> Result<Vec<SubmissionId>, CheckpointError>;
}

/// Assemble a resume point from per-index handles, verifying the completed
/// prefix is gapless.
pub(crate) fn resume_point_from_parts(
    submission: &SubmissionId,
    by_index: FxHashMap<usize, StatusHandle>,
    total_chunks: Option<usize>,
) -> Result<Option<ResumePoint>, CheckpointError> {
    let Some(last) = by_index.keys().copied().max() else {
        return Ok(None);
    };
    let mut handles = Vec::with_capacity(last + 1);
    for index in 0..=last {
        match by_index.get(&index) {
            Some(handle) => handles.push(handle.clone()),
            None => {
                return Err(CheckpointError::MissingChunk {
                    submission: submission.clone(),
                    index,
                });
            }
        }
    }
    Ok(Some(ResumePoint {
        last_completed: ChunkFileId::new(submission.clone(), last),
        handles,
        total_chunks,
    }))
}
