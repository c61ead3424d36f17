//! Submits one chunk, resolving references to entities earlier chunks created.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use super::client::{DepositClient, DepositError};
use super::codec::{ChunkCodec, CodecError, ResolvedChunk};
use crate::package::{Manifestation, SubPackage, Unit, UnitId};
use crate::types::StatusHandle;

/// Failures while preparing or performing one chunk submission.
#[derive(Debug, Error, Diagnostic)]
pub enum SubmitError {
    #[error("unit {unit} is not in this chunk and no prior chunk created it")]
    #[diagnostic(
        code(packferry::deposit::unresolved_reference),
        help("chunks must go up in split order so earlier chunks create the units later chunks reference")
    )]
    UnresolvedReference { unit: UnitId },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Deposit(#[from] DepositError),
}

/// Encodes and posts chunks, one at a time.
///
/// Before a chunk goes up, every reference to a unit outside the chunk is
/// rewritten to the remote id an earlier chunk's deposit created. The remote
/// ids come from the created-id maps behind the prior status handles, fetched
/// fresh per submission.
pub struct ChunkSubmitter<'a> {
    client: &'a dyn DepositClient,
    codec: &'a dyn ChunkCodec,
}

impl<'a> ChunkSubmitter<'a> {
    pub fn new(client: &'a dyn DepositClient, codec: &'a dyn ChunkCodec) -> Self {
        Self { client, codec }
    }

    /// Submit `chunk`, resolving out-of-chunk unit references through
    /// `prior_handles` (the status handles of every completed earlier chunk,
    /// in order). Returns the status handle the endpoint assigned.
    pub async fn submit(
        &self,
        chunk: &SubPackage,
        prior_handles: &[StatusHandle],
    ) -> Result<StatusHandle, SubmitError> {
        let external = external_unit_refs(chunk);
        let mut remote_units: FxHashMap<UnitId, String> = FxHashMap::default();

        if !external.is_empty() {
            let mut created: FxHashMap<String, String> = FxHashMap::default();
            for handle in prior_handles {
                created.extend(self.client.created_ids(handle).await?);
            }
            for unit in external {
                match created.get(unit.as_str()) {
                    Some(remote) => {
                        remote_units.insert(unit, remote.clone());
                    }
                    None => return Err(SubmitError::UnresolvedReference { unit }),
                }
            }
        }

        debug!(
            index = chunk.index(),
            files = chunk.file_count(),
            resolved = remote_units.len(),
            "submitting chunk"
        );
        let resolved = ResolvedChunk {
            chunk: chunk.clone(),
            remote_units,
        };
        let encoded = self.codec.encode(&resolved)?;
        let receipt = self.client.submit_chunk(encoded).await?;
        Ok(receipt.status_handle)
    }
}

/// Units referenced by `chunk` that do not travel inside it: manifestation
/// owners shipped earlier and parents living in the structural chunk.
fn external_unit_refs(chunk: &SubPackage) -> Vec<UnitId> {
    let local: FxHashSet<&UnitId> = chunk.units().iter().map(Unit::id).collect();
    let mut seen: FxHashSet<UnitId> = FxHashSet::default();
    let mut external: Vec<UnitId> = Vec::new();
    let referenced = chunk
        .manifestations()
        .iter()
        .map(Manifestation::unit)
        .chain(chunk.units().iter().filter_map(Unit::parent));
    for unit in referenced {
        if !local.contains(unit) && seen.insert(unit.clone()) {
            external.push(unit.clone());
        }
    }
    external
}
