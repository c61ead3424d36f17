//! Plain-text checkpoint log, the primary backend.
//!
//! Two append-only files under one directory:
//!
//! - `checkpoints.log`: one line per completed chunk,
//!   `<chunkFileId>\t<statusHandle>`
//! - `chunk-totals.log`: one line per submission,
//!   `<submissionId>\t<totalChunkCount>`
//!
//! Each record is appended as a single whole-line write. The format is for
//! operators as much as for the code: a halted submission can be inspected,
//! and in an emergency repaired, with a text editor.

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::{resume_point_from_parts, CheckpointError, CheckpointStore, ResumePoint};
use crate::types::{ChunkFileId, StatusHandle, SubmissionId};

/// Checkpoint store backed by append-only text files.
///
/// Assumes a single writer per submission; cross-process locking is the
/// caller's concern.
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    log_path: PathBuf,
    totals_path: PathBuf,
}

impl FileCheckpointStore {
    /// Store logs under `dir`, creating it lazily on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            log_path: dir.join("checkpoints.log"),
            totals_path: dir.join("chunk-totals.log"),
            dir,
        }
    }

    /// Path of the chunk completion log.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    async fn append_line(&self, path: &Path, line: String) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CheckpointError::backend(format!("create dir: {e}")))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| CheckpointError::backend(format!("open log: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| CheckpointError::backend(format!("append: {e}")))?;
        file.sync_data()
            .await
            .map_err(|e| CheckpointError::backend(format!("sync: {e}")))?;
        Ok(())
    }

    /// File contents, or `None` when the file does not exist yet.
    async fn read_log(&self, path: &Path) -> Result<Option<String>, CheckpointError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CheckpointError::backend(format!("read log: {e}"))),
        }
    }

    async fn total_chunks_of(
        &self,
        submission: &SubmissionId,
    ) -> Result<Option<usize>, CheckpointError> {
        let Some(content) = self.read_log(&self.totals_path).await? else {
            return Ok(None);
        };
        for line in content.lines().filter(|l| !l.is_empty()) {
            let (recorded, total) = line
                .split_once('\t')
                .ok_or_else(|| CheckpointError::Corrupt {
                    record: line.to_string(),
                })?;
            if recorded == submission.as_str() {
                let total: usize = total.parse().map_err(|_| CheckpointError::Corrupt {
                    record: line.to_string(),
                })?;
                return Ok(Some(total));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    #[instrument(skip(self, handle), fields(chunk = %chunk), err)]
    async fn append(
        &self,
        chunk: &ChunkFileId,
        handle: &StatusHandle,
    ) -> Result<(), CheckpointError> {
        let line = format!("{}\t{}\n", chunk.encode(), handle);
        self.append_line(&self.log_path, line).await?;
        debug!("checkpoint appended");
        Ok(())
    }

    #[instrument(skip(self), fields(submission = %submission), err)]
    async fn record_total_chunks(
        &self,
        submission: &SubmissionId,
        total: usize,
    ) -> Result<(), CheckpointError> {
        if self.total_chunks_of(submission).await?.is_some() {
            return Ok(());
        }
        let line = format!("{submission}\t{total}\n");
        self.append_line(&self.totals_path, line).await
    }

    #[instrument(skip(self), fields(submission = %submission), err)]
    async fn resume(
        &self,
        submission: &SubmissionId,
    ) -> Result<Option<ResumePoint>, CheckpointError> {
        let Some(content) = self.read_log(&self.log_path).await? else {
            return Ok(None);
        };
        let mut by_index: FxHashMap<usize, StatusHandle> = FxHashMap::default();
        for line in content.lines().filter(|l| !l.is_empty()) {
            let (id_part, handle_part) =
                line.split_once('\t')
                    .ok_or_else(|| CheckpointError::Corrupt {
                        record: line.to_string(),
                    })?;
            let chunk = ChunkFileId::decode(id_part).ok_or_else(|| CheckpointError::Corrupt {
                record: line.to_string(),
            })?;
            if chunk.submission() != submission {
                continue;
            }
            let handle: StatusHandle =
                handle_part
                    .parse()
                    .map_err(|_| CheckpointError::Corrupt {
                        record: line.to_string(),
                    })?;
            by_index.insert(chunk.index(), handle);
        }
        let total = self.total_chunks_of(submission).await?;
        resume_point_from_parts(submission, by_index, total)
    }

    async fn list_submissions(&self) -> Result<Vec<SubmissionId>, CheckpointError> {
        let Some(content) = self.read_log(&self.log_path).await? else {
            return Ok(Vec::new());
        };
        let mut seen: FxHashSet<SubmissionId> = FxHashSet::default();
        let mut submissions = Vec::new();
        for line in content.lines().filter(|l| !l.is_empty()) {
            let Some((id_part, _)) = line.split_once('\t') else {
                continue;
            };
            let Some(chunk) = ChunkFileId::decode(id_part) else {
                continue;
            };
            if seen.insert(chunk.submission().clone()) {
                submissions.push(chunk.submission().clone());
            }
        }
        Ok(submissions)
    }
}
