use std::time::Duration;

use packferry::progress::{MemorySink, ProgressBus, ProgressScope};
use packferry::provenance::{MemoryRecorder, ProvenanceStatus};
use packferry::status::{ChunkClassifier, ChunkOutcome, PollConfig, INGEST_COMPLETE};

mod common;
use common::*;

#[tokio::test]
async fn cumulative_percent_over_single_event_batches() {
    let client = ScriptedClient::new(Vec::new());
    client.seed_batches(
        &handle(0),
        vec![
            Ok(vec![event("virus.scan", 0)]),
            Ok(vec![event("virus.scan", 1)]),
            Ok(vec![event("virus.scan", 2)]),
            Ok(vec![event(INGEST_COMPLETE, 3)]),
        ],
    );
    let recorder = MemoryRecorder::new();
    let clock = manual_clock();
    let bus = ProgressBus::default();
    let classifier = ChunkClassifier::new(
        &client,
        &recorder,
        clock.as_ref(),
        bus.sender(),
        PollConfig::default(),
    );

    let outcome = classifier.run(&context(3, 6)).await.unwrap();

    assert_eq!(outcome, ChunkOutcome::Completed);
    let records = recorder.snapshot();
    let reported: Vec<(&str, u8)> = records
        .iter()
        .map(|r| (r.event_type.as_str(), r.percent))
        .collect();
    assert_eq!(
        reported,
        vec![
            ("virus.scan", 33),
            ("virus.scan", 67),
            ("virus.scan", 100),
            (INGEST_COMPLETE, 100),
        ]
    );
    assert_eq!(records[2].status, ProvenanceStatus::Pending);
    assert_eq!(records[3].status, ProvenanceStatus::Completed);
    assert_eq!(client.polls(), 4);
}

#[tokio::test]
async fn polls_pass_the_last_seen_timestamp() {
    let client = ScriptedClient::new(Vec::new());
    client.seed_batches(
        &handle(0),
        vec![
            Ok(vec![event("virus.scan", 0)]),
            Ok(vec![event("virus.scan", 7)]),
            Ok(vec![event(INGEST_COMPLETE, 9)]),
        ],
    );
    let recorder = MemoryRecorder::new();
    let clock = manual_clock();
    let bus = ProgressBus::default();
    let classifier = ChunkClassifier::new(
        &client,
        &recorder,
        clock.as_ref(),
        bus.sender(),
        PollConfig::default(),
    );

    classifier.run(&context(3, 6)).await.unwrap();

    assert_eq!(client.since_args(), vec![None, Some(at(0)), Some(at(7))]);
}

#[tokio::test]
async fn terminal_event_flushes_the_open_run_first() {
    let client = ScriptedClient::new(Vec::new());
    client.seed_batches(
        &handle(0),
        vec![Ok(vec![
            event("virus.scan", 0),
            event("virus.scan", 1),
            event(INGEST_COMPLETE, 2),
        ])],
    );
    let recorder = MemoryRecorder::new();
    let clock = manual_clock();
    let bus = ProgressBus::default();
    let classifier = ChunkClassifier::new(
        &client,
        &recorder,
        clock.as_ref(),
        bus.sender(),
        PollConfig::default(),
    );

    let outcome = classifier.run(&context(3, 6)).await.unwrap();

    assert_eq!(outcome, ChunkOutcome::Completed);
    let records = recorder.snapshot();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].percent, 67);
    assert_eq!(records[0].status, ProvenanceStatus::Pending);
    assert_eq!(records[1].event_type, INGEST_COMPLETE);
}

#[tokio::test]
async fn failure_event_yields_failed_outcome() {
    let client = ScriptedClient::new(Vec::new());
    client.seed_batches(
        &handle(0),
        vec![
            Ok(vec![event("virus.scan", 0)]),
            Ok(vec![event("validation.fail", 1)]),
        ],
    );
    let recorder = MemoryRecorder::new();
    let clock = manual_clock();
    let bus = ProgressBus::default();
    let classifier = ChunkClassifier::new(
        &client,
        &recorder,
        clock.as_ref(),
        bus.sender(),
        PollConfig::default(),
    );

    let outcome = classifier.run(&context(3, 6)).await.unwrap();

    assert_eq!(
        outcome,
        ChunkOutcome::Failed {
            event_type: "validation.fail".to_string(),
        }
    );
    let records = recorder.snapshot();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].percent, 33);
    assert_eq!(records[1].event_type, "validation.fail");
    assert_eq!(records[1].percent, 100);
    assert_eq!(records[1].status, ProvenanceStatus::Failed);
}

#[tokio::test]
async fn batches_are_sorted_by_timestamp_before_classification() {
    // Delivered out of order; the completion tag actually happened last.
    let client = ScriptedClient::new(Vec::new());
    client.seed_batches(
        &handle(0),
        vec![Ok(vec![
            event(INGEST_COMPLETE, 5),
            event("virus.scan", 0),
            event("virus.scan", 1),
        ])],
    );
    let recorder = MemoryRecorder::new();
    let clock = manual_clock();
    let bus = ProgressBus::default();
    let classifier = ChunkClassifier::new(
        &client,
        &recorder,
        clock.as_ref(),
        bus.sender(),
        PollConfig::default(),
    );

    let outcome = classifier.run(&context(3, 6)).await.unwrap();

    assert_eq!(outcome, ChunkOutcome::Completed);
    let records = recorder.snapshot();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].event_type, "virus.scan");
    assert_eq!(records[0].percent, 67);
}

#[tokio::test]
async fn transient_fetch_failures_keep_polling() {
    let client = ScriptedClient::new(Vec::new());
    client.seed_batches(
        &handle(0),
        vec![
            Err("connection reset".to_string()),
            Ok(vec![event(INGEST_COMPLETE, 0)]),
        ],
    );
    let recorder = MemoryRecorder::new();
    let clock = manual_clock();
    let bus = ProgressBus::default();
    let classifier = ChunkClassifier::new(
        &client,
        &recorder,
        clock.as_ref(),
        bus.sender(),
        PollConfig::default(),
    );

    let outcome = classifier.run(&context(3, 6)).await.unwrap();

    assert_eq!(outcome, ChunkOutcome::Completed);
    assert_eq!(client.polls(), 2);
}

#[tokio::test]
async fn unknown_event_types_are_skipped() {
    let client = ScriptedClient::new(Vec::new());
    client.seed_batches(
        &handle(0),
        vec![Ok(vec![
            event("queue.position", 0),
            event(INGEST_COMPLETE, 1),
        ])],
    );
    let recorder = MemoryRecorder::new();
    let clock = manual_clock();
    let bus = ProgressBus::default();
    let classifier = ChunkClassifier::new(
        &client,
        &recorder,
        clock.as_ref(),
        bus.sender(),
        PollConfig::default(),
    );

    let outcome = classifier.run(&context(3, 6)).await.unwrap();

    assert_eq!(outcome, ChunkOutcome::Completed);
    let records = recorder.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_type, INGEST_COMPLETE);
}

#[tokio::test]
async fn single_shot_event_reports_half_exactly_once() {
    let client = ScriptedClient::new(Vec::new());
    client.seed_batches(
        &handle(0),
        vec![
            Ok(vec![event("manifest.digest", 0), event("manifest.digest", 1)]),
            Ok(vec![event(INGEST_COMPLETE, 2)]),
        ],
    );
    let recorder = MemoryRecorder::new();
    let clock = manual_clock();
    let bus = ProgressBus::default();
    let classifier = ChunkClassifier::new(
        &client,
        &recorder,
        clock.as_ref(),
        bus.sender(),
        PollConfig::default(),
    );

    classifier.run(&context(3, 6)).await.unwrap();

    let records = recorder.snapshot();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].event_type, "manifest.digest");
    assert_eq!(records[0].percent, 50);
}

#[tokio::test]
async fn per_entity_events_use_the_entity_denominator() {
    let client = ScriptedClient::new(Vec::new());
    client.seed_batches(
        &handle(0),
        vec![
            Ok(vec![event("object.register", 0), event("object.register", 1)]),
            Ok(vec![event(INGEST_COMPLETE, 2)]),
        ],
    );
    let recorder = MemoryRecorder::new();
    let clock = manual_clock();
    let bus = ProgressBus::default();
    let classifier = ChunkClassifier::new(
        &client,
        &recorder,
        clock.as_ref(),
        bus.sender(),
        PollConfig::default(),
    );

    classifier.run(&context(0, 4)).await.unwrap();

    let records = recorder.snapshot();
    assert_eq!(records[0].event_type, "object.register");
    assert_eq!(records[0].percent, 50);
}

#[tokio::test]
async fn polling_ceiling_times_out_quiet_chunks() {
    let client = ScriptedClient::new(Vec::new());
    let recorder = MemoryRecorder::new();
    let clock = manual_clock();
    let bus = ProgressBus::default();
    let config = PollConfig::default()
        .with_interval(Duration::from_secs(5))
        .with_ceiling(Duration::from_secs(20));
    let classifier =
        ChunkClassifier::new(&client, &recorder, clock.as_ref(), bus.sender(), config);

    let outcome = classifier.run(&context(3, 6)).await.unwrap();

    assert_eq!(outcome, ChunkOutcome::TimedOut);
    assert_eq!(client.polls(), 4);
    assert_eq!(clock.slept().len(), 4);
    assert!(recorder.snapshot().is_empty());
}

#[tokio::test]
async fn progress_events_mirror_provenance_records() {
    let client = ScriptedClient::new(Vec::new());
    client.seed_batches(
        &handle(0),
        vec![
            Ok(vec![event("virus.scan", 0)]),
            Ok(vec![event("virus.scan", 1), event(INGEST_COMPLETE, 2)]),
        ],
    );
    let recorder = MemoryRecorder::new();
    let clock = manual_clock();
    let sink = MemorySink::new();
    let bus = ProgressBus::with_sink(sink.clone());
    bus.listen();
    let classifier = ChunkClassifier::new(
        &client,
        &recorder,
        clock.as_ref(),
        bus.sender(),
        PollConfig::default(),
    );

    classifier.run(&context(3, 6)).await.unwrap();
    bus.stop().await;

    let events = sink.snapshot();
    let percents: Vec<Option<u8>> = events.iter().map(|e| e.percent).collect();
    assert_eq!(percents, vec![Some(33), Some(67), Some(100)]);
    for event in &events {
        assert!(matches!(event.scope, ProgressScope::Chunk { index: 1, .. }));
    }
}
