//! Polls one chunk's status handle and classifies its event stream.
//!
//! The classifier is a small state machine: `Idle` until the remote reports
//! anything, `Pending` while progress events arrive, then exactly one of
//! `Completed`, `Failed`, or `TimedOut`. All counters live inside the
//! machine, scoped to the chunk being polled, so replaying an identical
//! batched stream reproduces the same outcome and the same percent sequence.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::clock::Clock;
use super::event::StatusEvent;
use super::table::{classify, EventClass};
use crate::deposit::DepositClient;
use crate::package::SubPackage;
use crate::progress::{ProgressEvent, ProgressSender};
use crate::provenance::{ProvenanceError, ProvenanceRecord, ProvenanceRecorder, ProvenanceStatus};
use crate::types::{ChunkFileId, StatusHandle, SubmissionId, WorkflowId};

/// Percent recorded for a single-shot step that has happened but is not the
/// whole chunk: an in-progress marker, overwritten by the terminal 100.
pub const SINGLE_SHOT_PERCENT: u8 = 50;

/// Where a chunk stands in its ingest lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkPhase {
    /// Submitted, nothing reported yet.
    Idle,
    /// The remote has reported at least one event.
    Pending,
    Completed,
    Failed,
    TimedOut,
}

impl ChunkPhase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

impl fmt::Display for ChunkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed-out"),
        }
    }
}

/// Terminal result of polling one chunk.
///
/// `Failed` means the remote reported a failure; `TimedOut` means the remote
/// reported nothing terminal before the ceiling, so its true state is
/// unknown. The distinction matters for operators deciding whether a resume
/// is safe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    Completed,
    Failed { event_type: String },
    TimedOut,
}

/// Polling cadence and ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Fixed pause between polls.
    pub interval: Duration,
    /// Total polling time after which a chunk is declared timed out.
    pub ceiling: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            ceiling: Duration::from_secs(50 * 60),
        }
    }
}

impl PollConfig {
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }
}

/// Per-chunk inputs the classifier needs to poll and build records.
#[derive(Clone, Debug)]
pub struct ChunkContext {
    pub submission: SubmissionId,
    pub workflow: WorkflowId,
    pub chunk_file_id: ChunkFileId,
    pub handle: StatusHandle,
    /// Denominator for per-file progress.
    pub files: usize,
    /// Denominator for per-entity progress.
    pub entities: usize,
}

impl ChunkContext {
    #[must_use]
    pub fn for_chunk(
        submission: SubmissionId,
        workflow: WorkflowId,
        chunk: &SubPackage,
        handle: StatusHandle,
    ) -> Self {
        Self {
            chunk_file_id: ChunkFileId::new(submission.clone(), chunk.index()),
            submission,
            workflow,
            handle,
            files: chunk.file_count(),
            entities: chunk.entity_count(),
        }
    }
}

/// Infrastructure failures that abort classification.
///
/// Status fetch errors are transient and never land here; only losing the
/// provenance trail stops the machine.
#[derive(Debug, Error, Diagnostic)]
pub enum ClassifierError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Provenance(#[from] ProvenanceError),
}

/// Drives one chunk from submission to a terminal outcome.
pub struct ChunkClassifier<'a> {
    client: &'a dyn DepositClient,
    recorder: &'a dyn ProvenanceRecorder,
    clock: &'a dyn Clock,
    progress: ProgressSender,
    config: PollConfig,
}

impl<'a> ChunkClassifier<'a> {
    pub fn new(
        client: &'a dyn DepositClient,
        recorder: &'a dyn ProvenanceRecorder,
        clock: &'a dyn Clock,
        progress: ProgressSender,
        config: PollConfig,
    ) -> Self {
        Self {
            client,
            recorder,
            clock,
            progress,
            config,
        }
    }

    /// Poll until the chunk reaches a terminal state or the ceiling passes.
    ///
    /// Each batch of fetched events is sorted by timestamp and classified in
    /// order. Multi-event progress is reported when the event type changes,
    /// when a count reaches its total, and at the end of each batch, without
    /// repeating a count already reported.
    #[instrument(skip(self, context), fields(chunk = %context.chunk_file_id), err)]
    pub async fn run(&self, context: &ChunkContext) -> Result<ChunkOutcome, ClassifierError> {
        let mut phase = ChunkPhase::Idle;
        let mut last_seen: Option<DateTime<Utc>> = None;
        let mut counters = ProgressCounters::default();
        let mut elapsed = Duration::ZERO;

        while elapsed < self.config.ceiling {
            self.clock.sleep(self.config.interval).await;
            elapsed += self.config.interval;

            let mut events = match self.client.events_since(&context.handle, last_seen).await {
                Ok(events) => events,
                Err(error) => {
                    warn!(%error, "status fetch failed; will poll again");
                    continue;
                }
            };
            events.sort_by_key(StatusEvent::timestamp);
            if let Some(last) = events.last() {
                last_seen = Some(last.timestamp());
                if phase == ChunkPhase::Idle {
                    phase = ChunkPhase::Pending;
                    debug!(phase = %phase, "first events observed");
                }
            }

            for event in &events {
                if event.is_completion() || event.is_failure() {
                    // A terminal event ends any open multi-event run first.
                    if let Some(emission) = counters.flush_current() {
                        self.emit(context, emission, ProvenanceStatus::Pending).await?;
                    }
                    let emission = Emission {
                        event_type: event.event_type().to_string(),
                        percent: 100,
                    };
                    return if event.is_completion() {
                        self.emit(context, emission, ProvenanceStatus::Completed).await?;
                        debug!(phase = %ChunkPhase::Completed, "chunk ingest complete");
                        Ok(ChunkOutcome::Completed)
                    } else {
                        self.emit(context, emission, ProvenanceStatus::Failed).await?;
                        debug!(phase = %ChunkPhase::Failed, event_type = event.event_type(), "remote reported failure");
                        Ok(ChunkOutcome::Failed {
                            event_type: event.event_type().to_string(),
                        })
                    };
                }

                let Some(class) = classify(event.event_type()) else {
                    debug!(event_type = event.event_type(), "event type not in classification table");
                    continue;
                };
                let total = match class {
                    EventClass::SingleShot => 0,
                    EventClass::PerFile => context.files,
                    EventClass::PerEntity => context.entities,
                };
                if class != EventClass::SingleShot && total == 0 {
                    debug!(event_type = event.event_type(), "no denominator for progress event");
                    continue;
                }
                for emission in counters.observe(event.event_type(), class, total) {
                    self.emit(context, emission, ProvenanceStatus::Pending).await?;
                }
            }

            // Report where an unfinished multi-event run stands at batch end.
            if let Some(emission) = counters.flush_current() {
                self.emit(context, emission, ProvenanceStatus::Pending).await?;
            }
        }

        debug!(phase = %ChunkPhase::TimedOut, elapsed_secs = elapsed.as_secs(), "polling ceiling reached");
        Ok(ChunkOutcome::TimedOut)
    }

    async fn emit(
        &self,
        context: &ChunkContext,
        emission: Emission,
        status: ProvenanceStatus,
    ) -> Result<(), ClassifierError> {
        let record = ProvenanceRecord {
            submission: context.submission.clone(),
            workflow: context.workflow.clone(),
            handle: context.handle.clone(),
            when: self.clock.now(),
            event_type: emission.event_type.clone(),
            percent: emission.percent,
            status,
        };
        self.recorder.insert(record).await?;
        self.progress.send(
            ProgressEvent::chunk(
                context.submission.clone(),
                context.chunk_file_id.index(),
                emission.event_type,
            )
            .with_percent(emission.percent),
        );
        Ok(())
    }
}

struct Emission {
    event_type: String,
    percent: u8,
}

/// Per-chunk progress bookkeeping across poll batches.
#[derive(Default)]
struct ProgressCounters {
    counts: FxHashMap<String, usize>,
    reported_single: FxHashSet<String>,
    last_emitted: FxHashMap<String, usize>,
    current: Option<CurrentRun>,
}

struct CurrentRun {
    event_type: String,
    total: usize,
}

impl ProgressCounters {
    /// Observe one classified event; returns what to report right now.
    fn observe(&mut self, event_type: &str, class: EventClass, total: usize) -> Vec<Emission> {
        let mut out = Vec::new();

        // A different type ends the current multi-event run.
        let changed = self
            .current
            .as_ref()
            .is_some_and(|run| run.event_type != event_type);
        if changed {
            if let Some(emission) = self.flush_current() {
                out.push(emission);
            }
        }

        match class {
            EventClass::SingleShot => {
                if self.reported_single.insert(event_type.to_string()) {
                    out.push(Emission {
                        event_type: event_type.to_string(),
                        percent: SINGLE_SHOT_PERCENT,
                    });
                }
            }
            EventClass::PerFile | EventClass::PerEntity => {
                let count = *self
                    .counts
                    .entry(event_type.to_string())
                    .and_modify(|c| *c += 1)
                    .or_insert(1);
                if count >= total {
                    // Total reached: report immediately and close the run.
                    self.current = None;
                    if self.last_emitted.get(event_type) != Some(&count) {
                        self.last_emitted.insert(event_type.to_string(), count);
                        out.push(Emission {
                            event_type: event_type.to_string(),
                            percent: percent_of(count, total),
                        });
                    }
                } else {
                    self.current = Some(CurrentRun {
                        event_type: event_type.to_string(),
                        total,
                    });
                }
            }
        }
        out
    }

    /// Close the open multi-event run, reporting its count unless that count
    /// was already reported.
    fn flush_current(&mut self) -> Option<Emission> {
        let run = self.current.take()?;
        let count = *self.counts.get(&run.event_type)?;
        if self.last_emitted.get(&run.event_type) == Some(&count) {
            return None;
        }
        self.last_emitted.insert(run.event_type.clone(), count);
        Some(Emission {
            percent: percent_of(count, run.total),
            event_type: run.event_type,
        })
    }
}

/// Rounded percent, capped at 100.
fn percent_of(count: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let rounded = (count * 100 + total / 2) / total;
    u8::try_from(rounded.min(100)).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(2, 3), 67);
        assert_eq!(percent_of(3, 3), 100);
        assert_eq!(percent_of(1, 4), 25);
    }

    #[test]
    fn percent_caps_at_one_hundred() {
        assert_eq!(percent_of(5, 3), 100);
        assert_eq!(percent_of(1, 0), 100);
    }

    #[test]
    fn single_shot_reports_once() {
        let mut counters = ProgressCounters::default();
        let first = counters.observe("manifest.digest", EventClass::SingleShot, 0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].percent, SINGLE_SHOT_PERCENT);
        let again = counters.observe("manifest.digest", EventClass::SingleShot, 0);
        assert!(again.is_empty());
    }

    #[test]
    fn type_change_flushes_open_run() {
        let mut counters = ProgressCounters::default();
        assert!(counters.observe("fixity.compute", EventClass::PerFile, 3).is_empty());
        assert!(counters.observe("fixity.compute", EventClass::PerFile, 3).is_empty());
        let out = counters.observe("object.register", EventClass::PerEntity, 5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].event_type, "fixity.compute");
        assert_eq!(out[0].percent, 67);
    }

    #[test]
    fn batch_end_flush_does_not_repeat_reported_count() {
        let mut counters = ProgressCounters::default();
        assert!(counters.observe("fixity.compute", EventClass::PerFile, 3).is_empty());
        let flushed = counters.flush_current().unwrap();
        assert_eq!(flushed.percent, 33);
        // Nothing new arrived, so there is nothing further to report.
        assert!(counters.flush_current().is_none());
    }

    #[test]
    fn reaching_total_reports_immediately() {
        let mut counters = ProgressCounters::default();
        for _ in 0..2 {
            counters.observe("virus.scan", EventClass::PerFile, 3);
        }
        let out = counters.observe("virus.scan", EventClass::PerFile, 3);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].percent, 100);
        assert!(counters.flush_current().is_none());
    }
}
