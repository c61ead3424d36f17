use std::sync::Arc;
use std::time::Duration;

use url::Url;

use packferry::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use packferry::config::{Credentials, IngestConfig};
use packferry::deposit::{CreatedIds, JsonChunkCodec};
use packferry::package::{FileRef, Manifestation, Package, Unit, UnitId};
use packferry::progress::{MemorySink, ProgressBus, ProgressScope};
use packferry::provenance::{MemoryRecorder, ProvenanceStatus};
use packferry::runner::{IngestError, IngestOutcome, IngestRunner};
use packferry::status::{PollConfig, INGEST_COMPLETE};
use packferry::types::{ChunkFileId, SubmissionId, WorkflowId};

mod common;
use common::*;

fn test_config() -> IngestConfig {
    IngestConfig::new(
        Url::parse("https://depot.test/api/deposits").unwrap(),
        Credentials::new("ingest", "secret"),
    )
    .with_max_files_per_chunk(3)
}

/// A script whose only batch completes the chunk.
fn completing(secs: i64) -> ChunkScript {
    ChunkScript::new().with_batch(vec![event(INGEST_COMPLETE, secs)])
}

fn runner_over(
    client: Arc<ScriptedClient>,
    checkpoints: Arc<InMemoryCheckpointStore>,
    recorder: Arc<MemoryRecorder>,
) -> IngestRunner {
    IngestRunner::new(
        test_config(),
        client,
        Arc::new(JsonChunkCodec::new()),
        checkpoints,
        recorder,
    )
    .with_clock(manual_clock())
}

#[tokio::test]
async fn run_drives_every_chunk_to_completion() {
    let scripts = vec![
        ChunkScript::new()
            .with_batch(vec![event("object.register", 0), event(INGEST_COMPLETE, 1)])
            .with_created("fonds", "remote-fonds"),
        completing(2),
        completing(3),
    ];
    let client = Arc::new(ScriptedClient::new(scripts));
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let recorder = Arc::new(MemoryRecorder::new());
    let runner = runner_over(client.clone(), checkpoints.clone(), recorder.clone());

    let report = runner
        .run(&two_series_fonds(), WorkflowId::from("accessions"))
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.total_chunks, 3);
    assert_eq!(report.chunks_completed, 3);

    let point = checkpoints.resume(&report.submission).await.unwrap().unwrap();
    assert!(point.is_complete());
    assert_eq!(point.handles, vec![handle(0), handle(1), handle(2)]);

    let submitted = client.submitted();
    let indices: Vec<usize> = submitted.iter().map(|c| c.chunk.index()).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(submitted[0].remote_units.is_empty());
    assert_eq!(
        submitted[1]
            .remote_units
            .get(&UnitId::from("fonds"))
            .map(String::as_str),
        Some("remote-fonds"),
    );

    let terminal = recorder
        .snapshot()
        .iter()
        .filter(|r| r.status == ProvenanceStatus::Completed)
        .count();
    assert_eq!(terminal, 3);
}

#[tokio::test]
async fn remote_failure_halts_with_a_resumable_report() {
    let scripts = vec![
        completing(0).with_created("fonds", "remote-fonds"),
        ChunkScript::new().with_batch(vec![event("virus.scan.fail", 1)]),
    ];
    let client = Arc::new(ScriptedClient::new(scripts));
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let runner = runner_over(client.clone(), checkpoints.clone(), Arc::new(MemoryRecorder::new()));

    let report = runner
        .run(&two_series_fonds(), WorkflowId::from("accessions"))
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        IngestOutcome::ChunkFailed {
            index: 1,
            event_type: "virus.scan.fail".to_string(),
        }
    );
    assert!(!report.is_complete());
    assert_eq!(report.chunks_completed, 1);

    // The third chunk was never submitted.
    assert_eq!(client.submitted().len(), 2);

    let point = checkpoints.resume(&report.submission).await.unwrap().unwrap();
    assert_eq!(point.handles, vec![handle(0)]);
    assert_eq!(point.next_index(), 1);
    assert_eq!(point.total_chunks, Some(3));
}

#[tokio::test]
async fn resume_picks_up_after_the_last_completed_chunk() {
    let package = two_series_fonds();
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());

    let scripts = vec![
        completing(0).with_created("fonds", "remote-fonds"),
        ChunkScript::new().with_batch(vec![event("virus.scan.fail", 1)]),
    ];
    let first_client = Arc::new(ScriptedClient::new(scripts));
    let first_runner = runner_over(
        first_client,
        checkpoints.clone(),
        Arc::new(MemoryRecorder::new()),
    );
    let first = first_runner
        .run(&package, WorkflowId::from("accessions"))
        .await
        .unwrap();
    assert!(!first.is_complete());

    // A fresh process: new client, handles numbered apart from the first.
    let client = Arc::new(
        ScriptedClient::new(vec![completing(5), completing(6)]).with_handle_offset(10),
    );
    let mut fonds_ids = CreatedIds::default();
    fonds_ids.insert("fonds".to_string(), "remote-fonds".to_string());
    client.seed_created(&handle(0), fonds_ids);

    let runner = runner_over(client.clone(), checkpoints.clone(), Arc::new(MemoryRecorder::new()));
    let second = runner
        .resume(&package, WorkflowId::from("accessions"), first.submission.clone())
        .await
        .unwrap();

    assert!(second.is_complete());
    assert_eq!(second.submission, first.submission);
    assert_eq!(second.chunks_completed, 3);

    let indices: Vec<usize> = client.submitted().iter().map(|c| c.chunk.index()).collect();
    assert_eq!(indices, vec![1, 2]);
    assert_eq!(
        client.submitted()[0]
            .remote_units
            .get(&UnitId::from("fonds"))
            .map(String::as_str),
        Some("remote-fonds"),
    );

    let point = checkpoints.resume(&first.submission).await.unwrap().unwrap();
    assert!(point.is_complete());
    assert_eq!(point.handles, vec![handle(0), handle(10), handle(11)]);
}

#[tokio::test]
async fn nested_description_levels_ingest_cleanly() {
    // fonds -> series (owns the files) -> item (owns nothing): the item must
    // ride with the series chunk, or chunk 0 would reference a unit no prior
    // chunk created and the run could never start.
    let package = Package::new()
        .with_unit(Unit::root("fonds", "Fonds"))
        .with_unit(Unit::child("series", "Correspondence", "fonds"))
        .with_unit(Unit::child("item", "Letter calendar", "series"))
        .with_file(FileRef::new("c-1", "corr/0001.tif"))
        .with_file(FileRef::new("c-2", "corr/0002.tif"))
        .with_manifestation(Manifestation::new("corr-master", "series", ["c-1", "c-2"]));

    let scripts = vec![completing(0).with_created("fonds", "remote-fonds"), completing(1)];
    let client = Arc::new(ScriptedClient::new(scripts));
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let runner = runner_over(client.clone(), checkpoints, Arc::new(MemoryRecorder::new()));

    let report = runner
        .run(&package, WorkflowId::from("accessions"))
        .await
        .unwrap();

    assert!(report.is_complete());
    let submitted = client.submitted();
    assert_eq!(submitted.len(), 2);
    assert!(submitted[0].remote_units.is_empty());
    assert!(submitted[1].chunk.contains_unit(&UnitId::from("item")));
    assert_eq!(
        submitted[1]
            .remote_units
            .get(&UnitId::from("fonds"))
            .map(String::as_str),
        Some("remote-fonds"),
    );
}

#[tokio::test]
async fn resume_of_an_unknown_submission_is_an_error() {
    let client = Arc::new(ScriptedClient::new(Vec::new()));
    let runner = runner_over(
        client,
        Arc::new(InMemoryCheckpointStore::new()),
        Arc::new(MemoryRecorder::new()),
    );

    let err = runner
        .resume(
            &two_series_fonds(),
            WorkflowId::from("accessions"),
            SubmissionId::from("never-ran"),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::UnknownSubmission { submission } if submission.as_str() == "never-ran"
    ));
}

#[tokio::test]
async fn resume_refuses_a_changed_chunk_count() {
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let sub = SubmissionId::from("sub-drift");
    checkpoints.record_total_chunks(&sub, 5).await.unwrap();
    checkpoints
        .append(&ChunkFileId::new(sub.clone(), 0), &handle(0))
        .await
        .unwrap();

    let client = Arc::new(ScriptedClient::new(Vec::new()));
    let runner = runner_over(client, checkpoints, Arc::new(MemoryRecorder::new()));

    let err = runner
        .resume(&two_series_fonds(), WorkflowId::from("accessions"), sub)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::ChunkCountDrift {
            recorded: 5,
            actual: 3,
        }
    ));
}

#[tokio::test]
async fn resume_refuses_a_log_longer_than_the_split() {
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let sub = SubmissionId::from("sub-overrun");
    // Three completed chunks on record, with no totals line to catch the
    // mismatch against a package that now splits into two.
    for index in 0..3 {
        checkpoints
            .append(&ChunkFileId::new(sub.clone(), index), &handle(index))
            .await
            .unwrap();
    }

    let client = Arc::new(ScriptedClient::new(Vec::new()));
    let runner = IngestRunner::new(
        test_config().with_max_files_per_chunk(10),
        client,
        Arc::new(JsonChunkCodec::new()),
        checkpoints,
        Arc::new(MemoryRecorder::new()),
    )
    .with_clock(manual_clock());

    let err = runner
        .resume(&two_series_fonds(), WorkflowId::from("accessions"), sub)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::ResumePastEnd {
            completed: 3,
            actual: 2,
        }
    ));
}

#[tokio::test]
async fn quiet_chunk_times_out_and_leaves_no_checkpoint() {
    let client = Arc::new(ScriptedClient::new(vec![ChunkScript::new()]));
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let runner = IngestRunner::new(
        test_config().with_poll(
            PollConfig::default()
                .with_interval(Duration::from_secs(5))
                .with_ceiling(Duration::from_secs(10)),
        ),
        client.clone(),
        Arc::new(JsonChunkCodec::new()),
        checkpoints.clone(),
        Arc::new(MemoryRecorder::new()),
    )
    .with_clock(manual_clock());

    let report = runner
        .run(&two_series_fonds(), WorkflowId::from("accessions"))
        .await
        .unwrap();

    assert_eq!(report.outcome, IngestOutcome::ChunkTimedOut { index: 0 });
    assert_eq!(report.chunks_completed, 0);
    assert_eq!(client.polls(), 2);

    // Nothing completed, so there is nothing to resume from.
    assert!(checkpoints.resume(&report.submission).await.unwrap().is_none());
}

#[tokio::test]
async fn rejected_submit_is_an_infrastructure_error() {
    let client = Arc::new(ScriptedClient::rejecting_submits());
    let runner = runner_over(
        client,
        Arc::new(InMemoryCheckpointStore::new()),
        Arc::new(MemoryRecorder::new()),
    );

    let err = runner
        .run(&two_series_fonds(), WorkflowId::from("accessions"))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Submit(_)));
}

#[tokio::test]
async fn progress_bus_reports_run_bookends() {
    let scripts = vec![
        completing(0).with_created("fonds", "remote-fonds"),
        completing(1),
        completing(2),
    ];
    let client = Arc::new(ScriptedClient::new(scripts));
    let sink = MemorySink::new();
    let runner = runner_over(
        client,
        Arc::new(InMemoryCheckpointStore::new()),
        Arc::new(MemoryRecorder::new()),
    )
    .with_progress_bus(ProgressBus::with_sink(sink.clone()));

    let report = runner
        .run(&two_series_fonds(), WorkflowId::from("accessions"))
        .await
        .unwrap();
    runner.progress().stop().await;
    assert!(report.is_complete());

    let events = sink.snapshot();
    assert!(matches!(events[0].scope, ProgressScope::Run { .. }));
    assert_eq!(events[0].message, "submission started: 3 chunks");

    let accepted = events.iter().filter(|e| e.message == "chunk accepted").count();
    assert_eq!(accepted, 3);

    let last = events.last().unwrap();
    assert_eq!(last.message, "submission complete");
    assert_eq!(last.percent, Some(100));
}
