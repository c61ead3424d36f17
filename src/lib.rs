//! # Packferry: Chunked Deposit of Oversized Submission Packages
//!
//! Packferry ships archival submission packages that are too large for a
//! single deposit request. It splits a package into bounded chunks, submits
//! them strictly in order, polls each chunk's status feed until the remote
//! reports a terminal state, records provenance along the way, and
//! checkpoints completed chunks so an interrupted submission resumes instead
//! of restarting.
//!
//! ## Core Concepts
//!
//! - **Package**: A forest of units, an ordered file table, and the
//!   manifestations binding them
//! - **Splitter**: Deterministic partition of a package into bounded
//!   sub-packages, structure first
//! - **Deposit**: Encoding a chunk, resolving cross-chunk references, and
//!   posting it to the endpoint
//! - **Status**: Polling the per-chunk event feed and classifying events into
//!   progress percentages
//! - **Checkpoints**: Durable record of completed chunks that powers resume
//! - **Provenance**: Per-event audit records describing what the remote did
//!   to the chunk
//!
//! ## Quick Start
//!
//! ### Describing a package
//!
//! Packages are built with chained constructors; order is meaningful and
//! preserved through the split:
//!
//! ```
//! use packferry::package::{FileRef, Manifestation, Package, Unit};
//!
//! let package = Package::new()
//!     .with_unit(Unit::root("fonds", "Archive fonds"))
//!     .with_unit(Unit::child("series", "Correspondence", "fonds"))
//!     .with_file(FileRef::new("f-1", "masters/0001.tif"))
//!     .with_file(FileRef::new("f-2", "masters/0002.tif"))
//!     .with_manifestation(Manifestation::new("m-1", "series", ["f-1", "f-2"]));
//!
//! assert_eq!(package.file_count(), 2);
//! ```
//!
//! ### Splitting into chunks
//!
//! The split is a pure function of the package and the file bound, so the
//! same inputs always land on the same chunks (which is what makes resume
//! safe):
//!
//! ```
//! use packferry::package::{FileRef, Manifestation, Package, Unit};
//! use packferry::splitter::split_package;
//!
//! # fn main() -> Result<(), packferry::splitter::SplitError> {
//! let package = Package::new()
//!     .with_unit(Unit::root("fonds", "Archive fonds"))
//!     .with_unit(Unit::child("series", "Correspondence", "fonds"))
//!     .with_file(FileRef::new("f-1", "masters/0001.tif"))
//!     .with_file(FileRef::new("f-2", "masters/0002.tif"))
//!     .with_manifestation(Manifestation::new("m-1", "series", ["f-1", "f-2"]));
//!
//! let chunks = split_package(&package, 1)?;
//!
//! // Chunk 0 carries the structure; the over-bound manifestation rides alone.
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].file_count(), 0);
//! assert_eq!(chunks[1].file_count(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ### Running an ingest
//!
//! The [`runner::IngestRunner`] wires the pipeline together over pluggable
//! collaborators:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use packferry::checkpoint::FileCheckpointStore;
//! use packferry::config::IngestConfig;
//! use packferry::deposit::{HttpDepositClient, JsonChunkCodec};
//! use packferry::provenance::MemoryRecorder;
//! use packferry::runner::IngestRunner;
//! use packferry::types::WorkflowId;
//! # use packferry::package::Package;
//! # async fn example(package: Package) -> miette::Result<()> {
//!
//! let config = IngestConfig::from_env()?;
//! let client = HttpDepositClient::new(config.endpoint.clone(), config.credentials.clone())?;
//! let runner = IngestRunner::new(
//!     config,
//!     Arc::new(client),
//!     Arc::new(JsonChunkCodec::new()),
//!     Arc::new(FileCheckpointStore::new("./checkpoints")),
//!     Arc::new(MemoryRecorder::new()),
//! );
//!
//! let report = runner.run(&package, WorkflowId::from("accessions")).await?;
//! if !report.is_complete() {
//!     // The checkpoint log already points at the next chunk; a later
//!     // `runner.resume(...)` picks up from there.
//!     eprintln!("halted: {:?}", report.outcome);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! A chunk the remote rejects or never finishes is an *outcome*
//! ([`runner::IngestOutcome::ChunkFailed`] / [`runner::IngestOutcome::ChunkTimedOut`]),
//! not an error: the report says where the run halted and resume picks up
//! from the checkpoint log. [`runner::IngestError`] is reserved for
//! infrastructure failures (invalid package, unresolvable references, lost
//! checkpoint or provenance backends), each carrying a diagnostic code and
//! help text via `miette`.
//!
//! ## Module Guide
//!
//! - [`package`] - Units, files, manifestations, and sub-packages
//! - [`splitter`] - Validation and deterministic chunking
//! - [`deposit`] - Chunk encoding, reference resolution, and the endpoint client
//! - [`status`] - Status polling, event classification, and progress math
//! - [`checkpoint`] - Resumable completion records (file, memory, sqlite)
//! - [`provenance`] - Audit records derived from remote events
//! - [`progress`] - In-process progress bus and sinks
//! - [`runner`] - High-level sequential ingest engine
//! - [`config`] - Endpoint, credential, and tuning knobs
//! - [`telemetry`] - Formatting for human-facing progress output

pub mod checkpoint;
pub mod config;
pub mod deposit;
pub mod package;
pub mod progress;
pub mod provenance;
pub mod runner;
pub mod splitter;
pub mod status;
pub mod telemetry;
pub mod types;
