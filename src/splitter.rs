//! Deterministic partitioning of a package into bounded sub-packages.
//!
//! [`split_package`] walks a validated [`Package`] and produces the ordered
//! chunk sequence the rest of the pipeline consumes. The split is a pure
//! function of the package and the bound, so a resumed run re-splits and
//! lands on exactly the chunks the original run produced.
//!
//! Partitioning rules:
//!
//! 1. Chunk 0 carries every root unit, plus every unit whose whole path to
//!    the root owns no manifestation. It never carries files.
//! 2. When the whole file table fits under the bound, everything else forms a
//!    single second chunk.
//! 3. Otherwise manifestations are packed in package order. A manifestation
//!    whose own file count exceeds the bound is emitted alone; it is the only
//!    case where a chunk may exceed the bound. A manifestation's files are
//!    never split across chunks.
//! 4. A non-root owner unit travels with the first chunk carrying one of its
//!    manifestations, and brings along its content-free descendants. Every
//!    unit's parent therefore lands in the same or an earlier chunk.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::package::{
    FileId, FileRef, Manifestation, ManifestationId, Package, SubPackage, Unit, UnitId,
};

/// Structural defects that make a package unsplittable.
///
/// Raised before any network traffic; a package that fails validation never
/// produces a submission.
#[derive(Debug, Error, Diagnostic)]
pub enum SplitError {
    #[error("chunk bound must be at least 1")]
    #[diagnostic(
        code(packferry::split::zero_bound),
        help("configure max_files_per_chunk to a positive value")
    )]
    ZeroBound,

    #[error("unit {unit} references unknown parent {parent}")]
    #[diagnostic(
        code(packferry::split::unknown_parent),
        help("every parent reference must name a unit declared in the package")
    )]
    UnknownParent { unit: UnitId, parent: UnitId },

    #[error("manifestation {manifestation} references unknown unit {unit}")]
    #[diagnostic(
        code(packferry::split::unknown_unit),
        help("every manifestation must name a unit declared in the package")
    )]
    UnknownUnit {
        manifestation: ManifestationId,
        unit: UnitId,
    },

    #[error("manifestation {manifestation} references unknown file {file}")]
    #[diagnostic(
        code(packferry::split::unknown_file),
        help("every file reference must name an entry in the package's file table")
    )]
    UnknownFile {
        manifestation: ManifestationId,
        file: FileId,
    },

    #[error("file {file} is claimed by both {first} and {second}")]
    #[diagnostic(
        code(packferry::split::file_shared),
        help("a file belongs to exactly one manifestation so it lands in exactly one chunk")
    )]
    FileShared {
        file: FileId,
        first: ManifestationId,
        second: ManifestationId,
    },

    #[error("file {file} is not claimed by any manifestation")]
    #[diagnostic(
        code(packferry::split::file_unclaimed),
        help("unclaimed files would never be deposited; remove them or add a manifestation")
    )]
    FileUnclaimed { file: FileId },
}

/// Partition `package` into its ordered chunk sequence.
///
/// Guarantees on success: chunk indices are contiguous from 0, every file
/// appears in exactly one chunk, and no chunk except an isolated oversized
/// manifestation exceeds `max_files_per_chunk`.
#[instrument(
    skip(package),
    fields(files = package.file_count(), bound = max_files_per_chunk),
    err
)]
pub fn split_package(
    package: &Package,
    max_files_per_chunk: usize,
) -> Result<Vec<SubPackage>, SplitError> {
    if max_files_per_chunk == 0 {
        return Err(SplitError::ZeroBound);
    }
    validate(package)?;

    let units_by_id: FxHashMap<&UnitId, &Unit> =
        package.units().iter().map(|u| (u.id(), u)).collect();
    let owners: FxHashSet<&UnitId> = package.manifestations().iter().map(|m| m.unit()).collect();
    let parents: FxHashMap<&UnitId, &UnitId> = package
        .units()
        .iter()
        .filter_map(|u| u.parent().map(|p| (u.id(), p)))
        .collect();

    // Chunk 0: structure only. A content-free unit stays here only while its
    // whole path to the root is also content-free; below an owner it rides
    // with that owner instead, so its parent never lands in a later chunk.
    let mut structural: Vec<Unit> = Vec::new();
    let mut attached: FxHashMap<UnitId, Vec<Unit>> = FxHashMap::default();
    for unit in package.units() {
        if owners.contains(unit.id()) && !unit.is_root() {
            continue; // ships with its first manifestation
        }
        match owning_ancestor(unit, &owners, &parents) {
            Some(anchor) => attached.entry(anchor).or_default().push(unit.clone()),
            None => structural.push(unit.clone()),
        }
    }
    let mut routing = Routing {
        units_by_id,
        shipped: structural.iter().map(|u| u.id().clone()).collect(),
        attached,
    };
    let mut chunks = vec![SubPackage::new(0, structural, Vec::new(), Vec::new())];

    if package.manifestations().is_empty() {
        debug!(chunks = chunks.len(), "package has no content chunks");
        return Ok(chunks);
    }

    if package.file_count() <= max_files_per_chunk {
        let group: Vec<Manifestation> = package.manifestations().to_vec();
        let chunk = build_content_chunk(1, group, package, &mut routing);
        debug!(index = 1, files = chunk.file_count(), "single content chunk");
        chunks.push(chunk);
        return Ok(chunks);
    }

    let mut pending: Vec<Manifestation> = Vec::new();
    let mut pending_files = 0usize;
    for manifestation in package.manifestations() {
        if manifestation.file_count() > max_files_per_chunk {
            if !pending.is_empty() {
                flush(&mut chunks, &mut pending, &mut pending_files, package, &mut routing);
            }
            pending.push(manifestation.clone());
            debug!(
                manifestation = %manifestation.id(),
                files = manifestation.file_count(),
                "isolating oversized manifestation"
            );
            flush(&mut chunks, &mut pending, &mut pending_files, package, &mut routing);
        } else if pending_files + manifestation.file_count() > max_files_per_chunk {
            flush(&mut chunks, &mut pending, &mut pending_files, package, &mut routing);
            pending.push(manifestation.clone());
            pending_files = manifestation.file_count();
        } else {
            pending.push(manifestation.clone());
            pending_files += manifestation.file_count();
        }
    }
    if !pending.is_empty() {
        flush(&mut chunks, &mut pending, &mut pending_files, package, &mut routing);
    }

    debug!(chunks = chunks.len(), "split complete");
    Ok(chunks)
}

/// Unit bookkeeping threaded through chunk assembly: which units shipped
/// already and which content-free units ride with which owner.
struct Routing<'p> {
    units_by_id: FxHashMap<&'p UnitId, &'p Unit>,
    shipped: FxHashSet<UnitId>,
    attached: FxHashMap<UnitId, Vec<Unit>>,
}

/// Nearest ancestor of `unit` that owns a manifestation, the root excluded.
/// `None` means the whole path to the root is content-free and the unit can
/// stay structural.
fn owning_ancestor(
    unit: &Unit,
    owners: &FxHashSet<&UnitId>,
    parents: &FxHashMap<&UnitId, &UnitId>,
) -> Option<UnitId> {
    let mut current = unit.id();
    while let Some(parent) = parents.get(current).copied() {
        if owners.contains(parent) && parents.contains_key(parent) {
            return Some(parent.clone());
        }
        current = parent;
    }
    None
}

fn flush(
    chunks: &mut Vec<SubPackage>,
    pending: &mut Vec<Manifestation>,
    pending_files: &mut usize,
    package: &Package,
    routing: &mut Routing<'_>,
) {
    let group = std::mem::take(pending);
    *pending_files = 0;
    let index = chunks.len();
    let chunk = build_content_chunk(index, group, package, routing);
    debug!(index, files = chunk.file_count(), "content chunk");
    chunks.push(chunk);
}

/// Assemble a content chunk from a group of manifestations.
///
/// Owner units ship once, with the first chunk that carries one of their
/// manifestations, bringing along the content-free units anchored below
/// them; files keep the package file-table order.
fn build_content_chunk(
    index: usize,
    group: Vec<Manifestation>,
    package: &Package,
    routing: &mut Routing<'_>,
) -> SubPackage {
    let mut units: Vec<Unit> = Vec::new();
    let mut claimed: FxHashSet<&FileId> = FxHashSet::default();
    for manifestation in &group {
        if !routing.shipped.contains(manifestation.unit()) {
            if let Some(unit) = routing.units_by_id.get(manifestation.unit()) {
                units.push((*unit).clone());
                routing.shipped.insert(manifestation.unit().clone());
                let riders = routing.attached.remove(manifestation.unit());
                for rider in riders.unwrap_or_default() {
                    routing.shipped.insert(rider.id().clone());
                    units.push(rider);
                }
            }
        }
        claimed.extend(manifestation.files());
    }
    let files: Vec<FileRef> = package
        .files()
        .iter()
        .filter(|f| claimed.contains(f.id()))
        .cloned()
        .collect();
    SubPackage::new(index, units, group, files)
}

fn validate(package: &Package) -> Result<(), SplitError> {
    let unit_ids: FxHashSet<&UnitId> = package.units().iter().map(Unit::id).collect();
    for unit in package.units() {
        if let Some(parent) = unit.parent() {
            if !unit_ids.contains(parent) {
                return Err(SplitError::UnknownParent {
                    unit: unit.id().clone(),
                    parent: parent.clone(),
                });
            }
        }
    }

    let file_ids: FxHashSet<&FileId> = package.files().iter().map(FileRef::id).collect();
    let mut claimed_by: FxHashMap<&FileId, &ManifestationId> = FxHashMap::default();
    for manifestation in package.manifestations() {
        if !unit_ids.contains(manifestation.unit()) {
            return Err(SplitError::UnknownUnit {
                manifestation: manifestation.id().clone(),
                unit: manifestation.unit().clone(),
            });
        }
        for file in manifestation.files() {
            if !file_ids.contains(file) {
                return Err(SplitError::UnknownFile {
                    manifestation: manifestation.id().clone(),
                    file: file.clone(),
                });
            }
            if let Some(first) = claimed_by.insert(file, manifestation.id()) {
                return Err(SplitError::FileShared {
                    file: file.clone(),
                    first: first.clone(),
                    second: manifestation.id().clone(),
                });
            }
        }
    }
    for file in package.files() {
        if !claimed_by.contains_key(file.id()) {
            return Err(SplitError::FileUnclaimed {
                file: file.id().clone(),
            });
        }
    }
    Ok(())
}
