//! Orchestrates one submission end to end.
//!
//! The runner owns the loop the whole crate exists for: split the package,
//! then for each chunk in order submit it, poll it to a terminal state,
//! checkpoint it, and only then move on. A chunk that fails or times out
//! halts the run with a resumable report; infrastructure failures surface as
//! errors instead.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::config::IngestConfig;
use crate::deposit::{ChunkCodec, ChunkSubmitter, DepositClient, SubmitError};
use crate::package::{Package, SubPackage};
use crate::progress::{ProgressBus, ProgressEvent};
use crate::provenance::ProvenanceRecorder;
use crate::splitter::{split_package, SplitError};
use crate::status::{
    ChunkClassifier, ChunkContext, ChunkOutcome, ClassifierError, Clock, SystemClock,
};
use crate::types::{StatusHandle, SubmissionId, WorkflowId};

/// How a run ended.
///
/// `ChunkFailed` and `ChunkTimedOut` are not errors: the pipeline did its
/// job and is reporting what the remote did. Both leave the checkpoint log
/// positioned for [`IngestRunner::resume`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Every chunk completed.
    Completed,
    /// The remote reported failure for the chunk at `index`; later chunks
    /// were not submitted.
    ChunkFailed { index: usize, event_type: String },
    /// The chunk at `index` reached no terminal state before the polling
    /// ceiling; its remote state is unknown.
    ChunkTimedOut { index: usize },
}

/// Result of driving one submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestReport {
    pub submission: SubmissionId,
    pub workflow: WorkflowId,
    pub total_chunks: usize,
    /// Chunks completed across the submission's lifetime, prior runs
    /// included.
    pub chunks_completed: usize,
    pub outcome: IngestOutcome,
}

impl IngestReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcome == IngestOutcome::Completed
    }
}

/// Infrastructure failures that abort a run.
#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Split(#[from] SplitError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("nothing to resume for submission {submission}")]
    #[diagnostic(
        code(packferry::runner::unknown_submission),
        help("a submission can resume only after at least one chunk completed; start a fresh run instead")
    )]
    UnknownSubmission { submission: SubmissionId },

    #[error("package split into {actual} chunks but the checkpoint log recorded {recorded}")]
    #[diagnostic(
        code(packferry::runner::chunk_count_drift),
        help("resume requires the same package and the same chunk bound as the original run")
    )]
    ChunkCountDrift { recorded: usize, actual: usize },

    #[error("checkpoint log records {completed} completed chunks but the package splits into {actual}")]
    #[diagnostic(
        code(packferry::runner::resume_past_end),
        help("the log does not fit this package and bound; resume with the inputs of the original run")
    )]
    ResumePastEnd { completed: usize, actual: usize },
}

/// Sequential ingest engine over pluggable collaborators.
///
/// One runner can drive any number of submissions; each `run`/`resume` call
/// is an independent sequential loop. The collaborators are trait objects so
/// deployments pick their endpoint adapter, package codec, checkpoint
/// backend, and provenance datastore, and tests script all four.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use packferry::checkpoint::FileCheckpointStore;
/// use packferry::config::IngestConfig;
/// use packferry::deposit::{HttpDepositClient, JsonChunkCodec};
/// use packferry::provenance::MemoryRecorder;
/// use packferry::runner::IngestRunner;
/// use packferry::types::WorkflowId;
/// # use packferry::package::Package;
/// # async fn example(package: Package) -> miette::Result<()> {
///
/// let config = IngestConfig::from_env()?;
/// let client = HttpDepositClient::new(config.endpoint.clone(), config.credentials.clone())?;
/// let runner = IngestRunner::new(
///     config,
///     Arc::new(client),
///     Arc::new(JsonChunkCodec::new()),
///     Arc::new(FileCheckpointStore::new("./checkpoints")),
///     Arc::new(MemoryRecorder::new()),
/// );
///
/// let report = runner.run(&package, WorkflowId::from("accessions")).await?;
/// println!("{:?}", report.outcome);
/// # Ok(())
/// # }
/// ```
pub struct IngestRunner {
    config: IngestConfig,
    client: Arc<dyn DepositClient>,
    codec: Arc<dyn ChunkCodec>,
    checkpoints: Arc<dyn CheckpointStore>,
    recorder: Arc<dyn ProvenanceRecorder>,
    clock: Arc<dyn Clock>,
    progress: ProgressBus,
}

impl IngestRunner {
    pub fn new(
        config: IngestConfig,
        client: Arc<dyn DepositClient>,
        codec: Arc<dyn ChunkCodec>,
        checkpoints: Arc<dyn CheckpointStore>,
        recorder: Arc<dyn ProvenanceRecorder>,
    ) -> Self {
        Self {
            config,
            client,
            codec,
            checkpoints,
            recorder,
            clock: Arc::new(SystemClock),
            progress: ProgressBus::default(),
        }
    }

    /// Replace the wall clock; tests use a manual clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the progress bus, e.g. to wire UI sinks before running.
    #[must_use]
    pub fn with_progress_bus(mut self, progress: ProgressBus) -> Self {
        self.progress = progress;
        self
    }

    /// The runner's progress bus, for attaching further sinks.
    #[must_use]
    pub fn progress(&self) -> &ProgressBus {
        &self.progress
    }

    /// Ingest `package` as a fresh submission.
    #[instrument(skip(self, package), fields(workflow = %workflow), err)]
    pub async fn run(
        &self,
        package: &Package,
        workflow: WorkflowId,
    ) -> Result<IngestReport, IngestError> {
        let chunks = split_package(package, self.config.max_files_per_chunk)?;
        let submission = SubmissionId::fresh();
        info!(submission = %submission, chunks = chunks.len(), "starting submission");
        self.progress.listen();
        self.progress.sender().send(ProgressEvent::run(
            submission.clone(),
            format!("submission started: {} chunks", chunks.len()),
        ));
        self.checkpoints
            .record_total_chunks(&submission, chunks.len())
            .await?;
        self.drive(&chunks, submission, workflow, Vec::new(), 0).await
    }

    /// Continue a halted submission from its checkpoint log.
    ///
    /// The package is re-split; the split being a pure function of package
    /// and bound, the same inputs land on the same chunks. The recorded
    /// total chunk count guards against drift in either input, and a log
    /// holding more completed chunks than the split produces is refused the
    /// same way, so an edited or mismatched log never indexes past the end.
    #[instrument(skip(self, package), fields(submission = %submission, workflow = %workflow), err)]
    pub async fn resume(
        &self,
        package: &Package,
        workflow: WorkflowId,
        submission: SubmissionId,
    ) -> Result<IngestReport, IngestError> {
        let chunks = split_package(package, self.config.max_files_per_chunk)?;
        let point = self
            .checkpoints
            .resume(&submission)
            .await?
            .ok_or_else(|| IngestError::UnknownSubmission {
                submission: submission.clone(),
            })?;
        if let Some(recorded) = point.total_chunks {
            if recorded != chunks.len() {
                return Err(IngestError::ChunkCountDrift {
                    recorded,
                    actual: chunks.len(),
                });
            }
        }
        let next = point.next_index();
        if next > chunks.len() {
            return Err(IngestError::ResumePastEnd {
                completed: next,
                actual: chunks.len(),
            });
        }
        info!(submission = %submission, next_chunk = next, "resuming submission");
        self.progress.listen();
        self.progress.sender().send(ProgressEvent::run(
            submission.clone(),
            format!("resuming at chunk {next}"),
        ));
        self.drive(&chunks, submission, workflow, point.handles, next)
            .await
    }

    async fn drive(
        &self,
        chunks: &[SubPackage],
        submission: SubmissionId,
        workflow: WorkflowId,
        mut handles: Vec<StatusHandle>,
        start_index: usize,
    ) -> Result<IngestReport, IngestError> {
        let total = chunks.len();
        let sender = self.progress.sender();
        let submitter = ChunkSubmitter::new(self.client.as_ref(), self.codec.as_ref());
        let classifier = ChunkClassifier::new(
            self.client.as_ref(),
            self.recorder.as_ref(),
            self.clock.as_ref(),
            sender.clone(),
            self.config.poll,
        );

        for chunk in &chunks[start_index..] {
            let handle = submitter.submit(chunk, &handles).await?;
            sender.send(ProgressEvent::chunk(submission.clone(), chunk.index(), "chunk accepted"));

            let context = ChunkContext::for_chunk(
                submission.clone(),
                workflow.clone(),
                chunk,
                handle.clone(),
            );
            match classifier.run(&context).await? {
                ChunkOutcome::Completed => {
                    self.checkpoints.append(&context.chunk_file_id, &handle).await?;
                    handles.push(handle);
                    info!(chunk = %context.chunk_file_id, "chunk completed");
                }
                ChunkOutcome::Failed { event_type } => {
                    warn!(
                        chunk = %context.chunk_file_id,
                        event_type = %event_type,
                        "halting: remote reported failure"
                    );
                    sender.send(ProgressEvent::run(
                        submission.clone(),
                        format!("halted at chunk {}: {event_type}", chunk.index()),
                    ));
                    return Ok(IngestReport {
                        submission,
                        workflow,
                        total_chunks: total,
                        chunks_completed: handles.len(),
                        outcome: IngestOutcome::ChunkFailed {
                            index: chunk.index(),
                            event_type,
                        },
                    });
                }
                ChunkOutcome::TimedOut => {
                    warn!(chunk = %context.chunk_file_id, "halting: chunk timed out");
                    sender.send(ProgressEvent::run(
                        submission.clone(),
                        format!("halted at chunk {}: timed out", chunk.index()),
                    ));
                    return Ok(IngestReport {
                        submission,
                        workflow,
                        total_chunks: total,
                        chunks_completed: handles.len(),
                        outcome: IngestOutcome::ChunkTimedOut {
                            index: chunk.index(),
                        },
                    });
                }
            }
        }

        info!(submission = %submission, "submission complete");
        sender.send(
            ProgressEvent::run(submission.clone(), "submission complete").with_percent(100),
        );
        Ok(IngestReport {
            submission,
            workflow,
            total_chunks: total,
            chunks_completed: handles.len(),
            outcome: IngestOutcome::Completed,
        })
    }
}
