#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rustc_hash::FxHashMap;

use packferry::deposit::{
    CreatedIds, DepositClient, DepositError, DepositReceipt, EncodedChunk, ResolvedChunk,
};
use packferry::status::{ChunkContext, ManualClock, StatusEvent};
use packferry::types::{ChunkFileId, StatusHandle, SubmissionId, WorkflowId};

/// Fixed origin for test timestamps.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// `base_time()` plus `secs` seconds.
pub fn at(secs: i64) -> DateTime<Utc> {
    base_time() + chrono::Duration::seconds(secs)
}

/// An event `secs` after the base time.
pub fn event(event_type: &str, secs: i64) -> StatusEvent {
    StatusEvent::new(event_type, at(secs))
}

pub fn handle(n: usize) -> StatusHandle {
    format!("https://depot.test/api/deposits/{n}/status")
        .parse()
        .unwrap()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::starting_at(base_time()))
}

/// A classifier context for a chunk with the given progress denominators.
pub fn context(files: usize, entities: usize) -> ChunkContext {
    let submission = SubmissionId::from("sub-under-test");
    ChunkContext {
        chunk_file_id: ChunkFileId::new(submission.clone(), 1),
        submission,
        workflow: WorkflowId::from("wf-test"),
        handle: handle(0),
        files,
        entities,
    }
}

/// What the scripted endpoint answers for the chunk submitted at one
/// position: poll batches in order, then the created-id map for its handle.
#[derive(Default)]
pub struct ChunkScript {
    batches: VecDeque<Result<Vec<StatusEvent>, String>>,
    created: CreatedIds,
}

impl ChunkScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one poll batch.
    pub fn with_batch(mut self, events: Vec<StatusEvent>) -> Self {
        self.batches.push_back(Ok(events));
        self
    }

    /// Append one failing poll; the classifier treats it as transient.
    pub fn with_fetch_error(mut self, message: &str) -> Self {
        self.batches.push_back(Err(message.to_string()));
        self
    }

    /// Record a created-id mapping served for this deposit's handle.
    pub fn with_created(mut self, local: &str, remote: &str) -> Self {
        self.created.insert(local.to_string(), remote.to_string());
        self
    }
}

struct ScriptedState {
    scripts: VecDeque<ChunkScript>,
    handle_offset: usize,
    reject_submits: bool,
    submitted: Vec<ResolvedChunk>,
    batches: FxHashMap<String, VecDeque<Result<Vec<StatusEvent>, String>>>,
    created: FxHashMap<String, CreatedIds>,
    since_args: Vec<Option<DateTime<Utc>>>,
    polls: usize,
}

/// Scripted stand-in for the deposit endpoint.
///
/// Submissions consume scripts in order; the deposit at position `n` gets
/// the handle `https://depot.test/api/deposits/{offset + n}/status`. Polls
/// drain that script's batches and then return empty batches forever.
pub struct ScriptedClient {
    state: Mutex<ScriptedState>,
}

impl ScriptedClient {
    pub fn new(scripts: Vec<ChunkScript>) -> Self {
        Self {
            state: Mutex::new(ScriptedState {
                scripts: scripts.into(),
                handle_offset: 0,
                reject_submits: false,
                submitted: Vec::new(),
                batches: FxHashMap::default(),
                created: FxHashMap::default(),
                since_args: Vec::new(),
                polls: 0,
            }),
        }
    }

    /// Rejects every submit with HTTP 400.
    pub fn rejecting_submits() -> Self {
        let client = Self::new(Vec::new());
        client.state.lock().unwrap().reject_submits = true;
        client
    }

    /// Start handle numbering at `offset`, so a second client in the same
    /// test never reuses the first client's handles.
    pub fn with_handle_offset(self, offset: usize) -> Self {
        self.state.lock().unwrap().handle_offset = offset;
        self
    }

    /// Pre-load poll batches for a handle no submit of this client produced.
    pub fn seed_batches(
        &self,
        handle: &StatusHandle,
        batches: Vec<Result<Vec<StatusEvent>, String>>,
    ) {
        self.state
            .lock()
            .unwrap()
            .batches
            .insert(handle.as_str().to_string(), batches.into());
    }

    /// Pre-load a created-id map for a handle another client produced.
    pub fn seed_created(&self, handle: &StatusHandle, ids: CreatedIds) {
        self.state
            .lock()
            .unwrap()
            .created
            .insert(handle.as_str().to_string(), ids);
    }

    /// Every chunk submitted so far, decoded, in order.
    pub fn submitted(&self) -> Vec<ResolvedChunk> {
        self.state.lock().unwrap().submitted.clone()
    }

    /// The `since` argument of every poll, in order.
    pub fn since_args(&self) -> Vec<Option<DateTime<Utc>>> {
        self.state.lock().unwrap().since_args.clone()
    }

    pub fn polls(&self) -> usize {
        self.state.lock().unwrap().polls
    }
}

#[async_trait]
impl DepositClient for ScriptedClient {
    async fn submit_chunk(&self, body: EncodedChunk) -> Result<DepositReceipt, DepositError> {
        let mut state = self.state.lock().unwrap();
        if state.reject_submits {
            return Err(DepositError::Rejected {
                status: 400,
                body: "scripted rejection".to_string(),
            });
        }
        let chunk: ResolvedChunk = serde_json::from_slice(&body.bytes)
            .map_err(|e| DepositError::other(format!("undecodable chunk: {e}")))?;
        let script = state.scripts.pop_front().unwrap_or_default();
        let assigned = handle(state.handle_offset + state.submitted.len());
        state
            .batches
            .insert(assigned.as_str().to_string(), script.batches);
        state
            .created
            .insert(assigned.as_str().to_string(), script.created);
        state.submitted.push(chunk);
        Ok(DepositReceipt {
            status_handle: assigned,
        })
    }

    async fn events_since(
        &self,
        handle: &StatusHandle,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<StatusEvent>, DepositError> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        state.since_args.push(since);
        match state
            .batches
            .get_mut(handle.as_str())
            .and_then(VecDeque::pop_front)
        {
            Some(Ok(events)) => Ok(events),
            Some(Err(message)) => Err(DepositError::other(message)),
            None => Ok(Vec::new()),
        }
    }

    async fn created_ids(&self, handle: &StatusHandle) -> Result<CreatedIds, DepositError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .created
            .get(handle.as_str())
            .cloned()
            .unwrap_or_default())
    }
}
