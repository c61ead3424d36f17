//! Volatile checkpoint store for tests and development.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};

use super::{resume_point_from_parts, CheckpointError, CheckpointStore, ResumePoint};
use crate::types::{ChunkFileId, StatusHandle, SubmissionId};

#[derive(Default)]
struct Inner {
    chunks: FxHashMap<SubmissionId, FxHashMap<usize, StatusHandle>>,
    totals: FxHashMap<SubmissionId, usize>,
    order: Vec<SubmissionId>,
}

/// In-memory [`CheckpointStore`]. Cloning shares the same records.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn append(
        &self,
        chunk: &ChunkFileId,
        handle: &StatusHandle,
    ) -> Result<(), CheckpointError> {
        let mut inner = self.inner.lock().unwrap();
        let submission = chunk.submission().clone();
        if !inner.chunks.contains_key(&submission) {
            inner.order.push(submission.clone());
        }
        inner
            .chunks
            .entry(submission)
            .or_default()
            .insert(chunk.index(), handle.clone());
        Ok(())
    }

    async fn record_total_chunks(
        &self,
        submission: &SubmissionId,
        total: usize,
    ) -> Result<(), CheckpointError> {
        self.inner
            .lock()
            .unwrap()
            .totals
            .entry(submission.clone())
            .or_insert(total);
        Ok(())
    }

    async fn resume(
        &self,
        submission: &SubmissionId,
    ) -> Result<Option<ResumePoint>, CheckpointError> {
        let (by_index, total) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.chunks.get(submission).cloned().unwrap_or_default(),
                inner.totals.get(submission).copied(),
            )
        };
        resume_point_from_parts(submission, by_index, total)
    }

    async fn list_submissions(&self) -> Result<Vec<SubmissionId>, CheckpointError> {
        Ok(self.inner.lock().unwrap().order.clone())
    }
}
