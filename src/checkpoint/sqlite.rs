//! SQLite checkpoint backend.
//!
//! Maps the append-only checkpoint contract onto two tables:
//!
//! - `submissions.id` and `submissions.total_chunks`
//! - `chunks(submission_id, chunk_index, status_handle)`
//!
//! Embedded migrations (`sqlx::migrate!("./migrations")`) run on connect and
//! are idempotent. Re-appending a chunk is an `INSERT OR REPLACE` keyed by
//! `(submission_id, chunk_index)`, which keeps duplicate completions
//! harmless, matching the text log's scan behavior.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::{resume_point_from_parts, CheckpointError, CheckpointStore, ResumePoint};
use crate::types::{ChunkFileId, StatusHandle, SubmissionId};

/// SQLite-backed [`CheckpointStore`].
pub struct SqliteCheckpointStore {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointStore").finish()
    }
}

impl SqliteCheckpointStore {
    /// Connect (or create) a SQLite database at `database_url` and apply
    /// embedded migrations. Example URL: `sqlite://packferry.db?mode=rwc`.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, CheckpointError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| CheckpointError::backend(format!("connect: {e}")))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| CheckpointError::backend(format!("migrate: {e}")))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    #[instrument(skip(self, handle), fields(chunk = %chunk), err)]
    async fn append(
        &self,
        chunk: &ChunkFileId,
        handle: &StatusHandle,
    ) -> Result<(), CheckpointError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CheckpointError::backend(format!("tx begin: {e}")))?;

        sqlx::query("INSERT OR IGNORE INTO submissions (id) VALUES (?1)")
            .bind(chunk.submission().as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| CheckpointError::backend(format!("insert submission: {e}")))?;

        let index = i64::try_from(chunk.index())
            .map_err(|_| CheckpointError::backend("chunk index out of range"))?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO chunks (submission_id, chunk_index, status_handle)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(chunk.submission().as_str())
        .bind(index)
        .bind(handle.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| CheckpointError::backend(format!("insert chunk: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| CheckpointError::backend(format!("tx commit: {e}")))
    }

    #[instrument(skip(self), fields(submission = %submission), err)]
    async fn record_total_chunks(
        &self,
        submission: &SubmissionId,
        total: usize,
    ) -> Result<(), CheckpointError> {
        let total = i64::try_from(total)
            .map_err(|_| CheckpointError::backend("total chunks out of range"))?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CheckpointError::backend(format!("tx begin: {e}")))?;

        sqlx::query("INSERT OR IGNORE INTO submissions (id, total_chunks) VALUES (?1, ?2)")
            .bind(submission.as_str())
            .bind(total)
            .execute(&mut *tx)
            .await
            .map_err(|e| CheckpointError::backend(format!("insert submission: {e}")))?;

        // The first recorded total wins.
        sqlx::query("UPDATE submissions SET total_chunks = ?2 WHERE id = ?1 AND total_chunks IS NULL")
            .bind(submission.as_str())
            .bind(total)
            .execute(&mut *tx)
            .await
            .map_err(|e| CheckpointError::backend(format!("update total: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| CheckpointError::backend(format!("tx commit: {e}")))
    }

    #[instrument(skip(self), fields(submission = %submission), err)]
    async fn resume(
        &self,
        submission: &SubmissionId,
    ) -> Result<Option<ResumePoint>, CheckpointError> {
        let rows = sqlx::query(
            "SELECT chunk_index, status_handle FROM chunks WHERE submission_id = ?1",
        )
        .bind(submission.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| CheckpointError::backend(format!("select chunks: {e}")))?;

        let mut by_index: FxHashMap<usize, StatusHandle> = FxHashMap::default();
        for row in rows {
            let index: i64 = row
                .try_get("chunk_index")
                .map_err(|e| CheckpointError::backend(format!("read chunk_index: {e}")))?;
            let handle: String = row
                .try_get("status_handle")
                .map_err(|e| CheckpointError::backend(format!("read status_handle: {e}")))?;
            let index = usize::try_from(index).map_err(|_| CheckpointError::Corrupt {
                record: format!("chunk_index {index}"),
            })?;
            let handle: StatusHandle = handle.parse().map_err(|_| CheckpointError::Corrupt {
                record: handle.clone(),
            })?;
            by_index.insert(index, handle);
        }

        let total_row = sqlx::query("SELECT total_chunks FROM submissions WHERE id = ?1")
            .bind(submission.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| CheckpointError::backend(format!("select total: {e}")))?;
        let total_chunks = match total_row {
            Some(row) => {
                let total: Option<i64> = row
                    .try_get("total_chunks")
                    .map_err(|e| CheckpointError::backend(format!("read total: {e}")))?;
                match total {
                    Some(total) => Some(usize::try_from(total).map_err(|_| {
                        CheckpointError::Corrupt {
                            record: format!("total_chunks {total}"),
                        }
                    })?),
                    None => None,
                }
            }
            None => None,
        };

        resume_point_from_parts(submission, by_index, total_chunks)
    }

    async fn list_submissions(&self) -> Result<Vec<SubmissionId>, CheckpointError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM submissions
            WHERE id IN (SELECT submission_id FROM chunks)
            ORDER BY rowid
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| CheckpointError::backend(format!("select submissions: {e}")))?;

        let mut submissions = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row
                .try_get("id")
                .map_err(|e| CheckpointError::backend(format!("read id: {e}")))?;
            submissions.push(SubmissionId::from(id));
        }
        Ok(submissions)
    }
}
