//! In-memory model of a submission package and its bounded sub-packages.
//!
//! A [`Package`] is the full graph handed to the pipeline: a forest of
//! [`Unit`]s, an ordered file table of [`FileRef`]s, and [`Manifestation`]s
//! binding units to the files that realize them. The splitter partitions a
//! package into [`SubPackage`]s (chunks), which are what the submitter
//! encodes and posts.
//!
//! The model is deliberately structural. Descriptive metadata beyond labels
//! stays with the caller; the pipeline only needs identity, ordering, and the
//! unit/file relationships that drive splitting and progress math.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

entity_id! {
    /// Identifies a unit within its package.
    UnitId
}

entity_id! {
    /// Identifies a manifestation within its package.
    ManifestationId
}

entity_id! {
    /// Identifies a file within its package's file table.
    FileId
}

/// A logical content node: a dataset, collection, or item record.
///
/// Units form a forest via the optional parent reference. Units without a
/// parent are roots and travel in the structural chunk; units owning
/// manifestations travel with their content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    id: UnitId,
    label: String,
    parent: Option<UnitId>,
}

impl Unit {
    /// A root unit with no parent.
    #[must_use]
    pub fn root(id: impl Into<UnitId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            parent: None,
        }
    }

    /// A child unit under `parent`.
    #[must_use]
    pub fn child(
        id: impl Into<UnitId>,
        label: impl Into<String>,
        parent: impl Into<UnitId>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            parent: Some(parent.into()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &UnitId {
        &self.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn parent(&self) -> Option<&UnitId> {
        self.parent.as_ref()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// One entry in a package's ordered file table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    id: FileId,
    path: String,
}

impl FileRef {
    #[must_use]
    pub fn new(id: impl Into<FileId>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &FileId {
        &self.id
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Binds one unit to the ordered set of files that realize it.
///
/// A manifestation's files are never split across chunks; a manifestation
/// whose file count alone exceeds the chunk bound becomes its own chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifestation {
    id: ManifestationId,
    unit: UnitId,
    files: Vec<FileId>,
}

impl Manifestation {
    #[must_use]
    pub fn new<I, F>(id: impl Into<ManifestationId>, unit: impl Into<UnitId>, files: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FileId>,
    {
        Self {
            id: id.into(),
            unit: unit.into(),
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ManifestationId {
        &self.id
    }

    /// The unit this manifestation realizes.
    #[must_use]
    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    #[must_use]
    pub fn files(&self) -> &[FileId] {
        &self.files
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// The full submission package handed to the pipeline.
///
/// Order is meaningful: the splitter walks manifestations in package order,
/// and the file table's order is preserved inside each chunk.
///
/// # Examples
///
/// ```rust
/// use packferry::package::{FileRef, Manifestation, Package, Unit};
///
/// let package = Package::new()
///     .with_unit(Unit::root("u-root", "Collection"))
///     .with_unit(Unit::child("u-1", "Item 1", "u-root"))
///     .with_file(FileRef::new("f-1", "data/one.bin"))
///     .with_manifestation(Manifestation::new("m-1", "u-1", ["f-1"]));
///
/// assert_eq!(package.file_count(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    units: Vec<Unit>,
    manifestations: Vec<Manifestation>,
    files: Vec<FileRef>,
}

impl Package {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.units.push(unit);
        self
    }

    #[must_use]
    pub fn with_manifestation(mut self, manifestation: Manifestation) -> Self {
        self.manifestations.push(manifestation);
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: FileRef) -> Self {
        self.files.push(file);
        self
    }

    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    #[must_use]
    pub fn manifestations(&self) -> &[Manifestation] {
        &self.manifestations
    }

    #[must_use]
    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    /// Total number of files in the package's file table.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// One bounded partition of a package, submitted as a single deposit.
///
/// Chunk 0 is the structural chunk: every root unit (and any unit owning no
/// manifestation), zero files. Later chunks carry manifestations, their
/// files, and each non-root owner unit the first time it appears.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubPackage {
    index: usize,
    units: Vec<Unit>,
    manifestations: Vec<Manifestation>,
    files: Vec<FileRef>,
}

impl SubPackage {
    #[must_use]
    pub(crate) fn new(
        index: usize,
        units: Vec<Unit>,
        manifestations: Vec<Manifestation>,
        files: Vec<FileRef>,
    ) -> Self {
        Self {
            index,
            units,
            manifestations,
            files,
        }
    }

    /// The chunk's 0-based position in the split sequence.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    #[must_use]
    pub fn manifestations(&self) -> &[Manifestation] {
        &self.manifestations
    }

    #[must_use]
    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    /// Number of files in this chunk; denominator for per-file progress.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Units + manifestations + files; denominator for per-entity progress.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.units.len() + self.manifestations.len() + self.files.len()
    }

    /// Whether `unit` travels inside this chunk.
    #[must_use]
    pub fn contains_unit(&self, unit: &UnitId) -> bool {
        self.units.iter().any(|u| u.id() == unit)
    }
}
