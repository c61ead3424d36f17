//! Demo: End-to-End Chunked Ingest
//!
//! This demonstration drives the full pipeline against a scripted in-process
//! deposit endpoint: a package is split into bounded chunks, each chunk is
//! submitted, polled to completion, checkpointed, and reported on the
//! progress bus.
//!
//! What You'll Learn:
//! 1. Package Construction: Units, files, and manifestations via builders
//! 2. Pipeline Wiring: `IngestRunner` over pluggable collaborators
//! 3. Progress Output: A `StdOutSink` on the progress bus
//! 4. Provenance: The audit trail recorded while chunks ingest
//! 5. Checkpoints: The resume point left behind by a completed run
//!
//! Running This Demo:
//! ```bash
//! cargo run --example ingest_demo
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use miette::{IntoDiagnostic, Result};
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use packferry::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use packferry::config::{Credentials, IngestConfig};
use packferry::deposit::{
    CreatedIds, DepositClient, DepositError, DepositReceipt, EncodedChunk, JsonChunkCodec,
    ResolvedChunk,
};
use packferry::package::{FileRef, Manifestation, Package, Unit};
use packferry::progress::{ProgressBus, StdOutSink};
use packferry::provenance::{MemoryRecorder, ProvenanceRecorder};
use packferry::runner::IngestRunner;
use packferry::status::{PollConfig, StatusEvent, INGEST_COMPLETE};
use packferry::types::{StatusHandle, WorkflowId};

/// Scripted stand-in for a remote deposit endpoint.
///
/// Each submitted chunk is decoded, assigned a status handle, and given the
/// event feed a cooperative remote would emit for it: per-entity registration
/// for the structural chunk, digest/scan/store rounds for content chunks,
/// and a completion tag at the end.
#[derive(Default)]
struct ScriptedDepot {
    deposits: Mutex<Vec<DepotEntry>>,
}

struct DepotEntry {
    handle: StatusHandle,
    events: Vec<StatusEvent>,
    created: CreatedIds,
}

impl ScriptedDepot {
    fn script_events(chunk: &ResolvedChunk) -> Vec<StatusEvent> {
        let base = Utc::now();
        let mut types: Vec<&str> = Vec::new();
        if chunk.chunk.file_count() == 0 {
            types.extend(std::iter::repeat_n("object.register", chunk.chunk.entity_count()));
        } else {
            types.push("manifest.digest");
            types.extend(std::iter::repeat_n("virus.scan", chunk.chunk.file_count()));
            types.extend(std::iter::repeat_n("bitstream.store", chunk.chunk.file_count()));
        }
        types.push(INGEST_COMPLETE);
        types
            .into_iter()
            .enumerate()
            .map(|(i, t)| StatusEvent::new(t, base + chrono::Duration::seconds(i as i64)))
            .collect()
    }
}

#[async_trait]
impl DepositClient for ScriptedDepot {
    async fn submit_chunk(&self, body: EncodedChunk) -> Result<DepositReceipt, DepositError> {
        let chunk: ResolvedChunk = serde_json::from_slice(&body.bytes)
            .map_err(|e| DepositError::other(format!("undecodable chunk: {e}")))?;

        let mut deposits = self.deposits.lock().unwrap();
        let url = format!("https://depot.invalid/api/deposits/{}/status", deposits.len());
        let handle: StatusHandle = Url::parse(&url)
            .map_err(|e| DepositError::other(format!("bad handle url: {e}")))?
            .into();

        let created = chunk
            .chunk
            .units()
            .iter()
            .map(|u| (u.id().to_string(), format!("remote-{}", u.id())))
            .collect();
        deposits.push(DepotEntry {
            handle: handle.clone(),
            events: Self::script_events(&chunk),
            created,
        });
        Ok(DepositReceipt {
            status_handle: handle,
        })
    }

    async fn events_since(
        &self,
        handle: &StatusHandle,
        since: Option<chrono::DateTime<Utc>>,
    ) -> Result<Vec<StatusEvent>, DepositError> {
        let deposits = self.deposits.lock().unwrap();
        let entry = deposits
            .iter()
            .find(|e| &e.handle == handle)
            .ok_or_else(|| DepositError::other("unknown status handle"))?;
        Ok(entry
            .events
            .iter()
            .filter(|e| since.is_none_or(|s| e.timestamp() > s))
            .cloned()
            .collect())
    }

    async fn created_ids(&self, handle: &StatusHandle) -> Result<CreatedIds, DepositError> {
        let deposits = self.deposits.lock().unwrap();
        let entry = deposits
            .iter()
            .find(|e| &e.handle == handle)
            .ok_or_else(|| DepositError::other("unknown status handle"))?;
        Ok(entry.created.clone())
    }
}

/// A small two-series fonds: seven master files across two manifestations.
fn build_package() -> Package {
    Package::new()
        .with_unit(Unit::root("fonds-523", "Estate papers of the Warden family"))
        .with_unit(Unit::child("corr", "Correspondence series", "fonds-523"))
        .with_unit(Unit::child("photos", "Photograph album", "fonds-523"))
        .with_file(FileRef::new("c-1", "corr/0001.tif"))
        .with_file(FileRef::new("c-2", "corr/0002.tif"))
        .with_file(FileRef::new("c-3", "corr/0003.tif"))
        .with_file(FileRef::new("c-4", "corr/0004.tif"))
        .with_file(FileRef::new("p-1", "photos/0001.tif"))
        .with_file(FileRef::new("p-2", "photos/0002.tif"))
        .with_file(FileRef::new("p-3", "photos/0003.tif"))
        .with_manifestation(Manifestation::new(
            "corr-master",
            "corr",
            ["c-1", "c-2", "c-3", "c-4"],
        ))
        .with_manifestation(Manifestation::new(
            "photos-master",
            "photos",
            ["p-1", "p-2", "p-3"],
        ))
}

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        // Log when spans are created/closed so we see instrumented async boundaries
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,packferry=info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn init_miette() {
    // Pretty panic reports
    miette::set_panic_hook();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_miette();
    demo().await
}

async fn demo() -> Result<()> {
    info!("\n╔══════════════════════════════════════════════════════════╗");
    info!("║                      Ingest Demo                         ║");
    info!("║          Chunked Deposit of a Two-Series Fonds           ║");
    info!("╚══════════════════════════════════════════════════════════╝\n");

    let package = build_package();
    let depot = Arc::new(ScriptedDepot::default());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let recorder = Arc::new(MemoryRecorder::new());

    // Bound of 3 files per chunk: the structural chunk, the four-file
    // correspondence manifestation alone, then the photo album.
    let config = IngestConfig::new(
        Url::parse("https://depot.invalid/api/deposits").into_diagnostic()?,
        Credentials::new("demo", "demo"),
    )
    .with_max_files_per_chunk(3)
    .with_poll(PollConfig::default().with_interval(Duration::from_millis(25)));

    let runner = IngestRunner::new(
        config,
        depot,
        Arc::new(JsonChunkCodec::new()),
        checkpoints.clone(),
        recorder.clone(),
    )
    .with_progress_bus(ProgressBus::with_sink(StdOutSink::default()));

    let report = runner
        .run(&package, WorkflowId::from("demo-accessions"))
        .await?;

    info!(
        submission = %report.submission,
        chunks = report.total_chunks,
        completed = report.chunks_completed,
        outcome = ?report.outcome,
        "ingest finished"
    );

    info!("--- provenance trail ---");
    for record in recorder.snapshot() {
        info!(
            chunk = %record.handle,
            event = %record.event_type,
            percent = record.percent,
            status = %record.status,
            "provenance"
        );
    }

    if let Some(point) = checkpoints.resume(&report.submission).await? {
        info!(
            last_completed = %point.last_completed,
            handles = point.handles.len(),
            complete = point.is_complete(),
            "resume point"
        );
    }

    runner.progress().stop().await;
    Ok(())
}
