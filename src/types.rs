//! Core identifier types for the packferry deposit pipeline.
//!
//! This module defines the stable identifiers that flow through splitting,
//! submission, checkpointing, and provenance recording. They are the domain
//! vocabulary the rest of the crate is written in.
//!
//! # Key Types
//!
//! - [`SubmissionId`]: Identifies one ingest run of a package
//! - [`WorkflowId`]: Identifies the workflow a submission belongs to
//! - [`ChunkFileId`]: Identifies one chunk of a submission, with a stable
//!   string form used in the checkpoint log
//! - [`StatusHandle`]: Typed wrapper over the status URL the deposit endpoint
//!   assigns to an accepted chunk
//!
//! # Examples
//!
//! ```rust
//! use packferry::types::{ChunkFileId, SubmissionId};
//!
//! let submission = SubmissionId::from("sub-42");
//! let chunk = ChunkFileId::new(submission, 3);
//!
//! // Encode for persistence
//! assert_eq!(chunk.encode(), "sub-42.00003");
//! assert_eq!(ChunkFileId::decode("sub-42.00003"), Some(chunk));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Identifies one ingest run of a package.
///
/// A fresh submission id is minted per run via [`SubmissionId::fresh`]; a
/// resumed run reuses the id recorded in the checkpoint store. The id is an
/// opaque string from the pipeline's perspective.
///
/// # Examples
///
/// ```rust
/// use packferry::types::SubmissionId;
///
/// let a = SubmissionId::fresh();
/// let b = SubmissionId::fresh();
/// assert_ne!(a, b);
///
/// let named = SubmissionId::from("sub-42");
/// assert_eq!(named.as_str(), "sub-42");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    /// Mint a new random submission id.
    #[must_use]
    pub fn fresh() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The id as a borrowed string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Allow string literals where a SubmissionId is expected.
impl From<&str> for SubmissionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubmissionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifies the workflow a submission belongs to.
///
/// Provenance records carry the workflow id so downstream history queries can
/// group submissions by the process that produced them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// The id as a borrowed string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkflowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifies one chunk of a submission.
///
/// A chunk file id pairs the owning [`SubmissionId`] with the chunk's 0-based
/// index. Its [`encode`](Self::encode)/[`decode`](Self::decode) string form,
/// `<submission>.<index padded to five digits>`, is what the checkpoint log
/// stores, so the form is stable.
///
/// # Examples
///
/// ```rust
/// use packferry::types::{ChunkFileId, SubmissionId};
///
/// let chunk = ChunkFileId::new(SubmissionId::from("sub-42"), 7);
/// assert_eq!(chunk.encode(), "sub-42.00007");
///
/// let decoded = ChunkFileId::decode("sub-42.00007").unwrap();
/// assert_eq!(decoded.index(), 7);
/// assert_eq!(decoded.submission().as_str(), "sub-42");
///
/// // Malformed forms decode to None rather than a guess.
/// assert_eq!(ChunkFileId::decode("no-index-here"), None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkFileId {
    submission: SubmissionId,
    index: usize,
}

impl ChunkFileId {
    #[must_use]
    pub fn new(submission: SubmissionId, index: usize) -> Self {
        Self { submission, index }
    }

    /// The submission this chunk belongs to.
    #[must_use]
    pub fn submission(&self) -> &SubmissionId {
        &self.submission
    }

    /// The chunk's 0-based position in the split sequence.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Encode into the persisted string form.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}.{:05}", self.submission, self.index)
    }

    /// Decode a persisted string form back into a chunk file id.
    ///
    /// Returns `None` when the string lacks the `<submission>.<index>` shape;
    /// the checkpoint stores surface that as a corrupt-record error.
    #[must_use]
    pub fn decode(s: &str) -> Option<Self> {
        let (submission, index) = s.rsplit_once('.')?;
        if submission.is_empty() {
            return None;
        }
        let index: usize = index.parse().ok()?;
        Some(Self {
            submission: SubmissionId::from(submission),
            index,
        })
    }
}

impl fmt::Display for ChunkFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Typed wrapper over the status URL the deposit endpoint assigns to an
/// accepted chunk.
///
/// The handle is polled for status events, and its `content` path variant is
/// fetched to learn the remote ids assigned to entities the chunk created.
///
/// # Examples
///
/// ```rust
/// use packferry::types::StatusHandle;
///
/// let handle: StatusHandle = "https://depot.example/api/sub-42/status"
///     .parse()
///     .unwrap();
/// assert_eq!(
///     handle.content_url().as_str(),
///     "https://depot.example/api/sub-42/content",
/// );
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusHandle(Url);

impl StatusHandle {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self(url)
    }

    /// The underlying status URL.
    #[must_use]
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// The handle as a borrowed string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The URL the created-id map is served from.
    ///
    /// Replaces the last `status` path segment with `content`; when no such
    /// segment exists, `content` is appended instead. URLs without a path
    /// (cannot-be-a-base forms) are returned unchanged.
    #[must_use]
    pub fn content_url(&self) -> Url {
        let mut segments: Vec<String> = match self.0.path_segments() {
            Some(iter) => iter.map(str::to_string).collect(),
            None => return self.0.clone(),
        };
        match segments.iter().rposition(|s| s == "status") {
            Some(pos) => segments[pos] = "content".to_string(),
            None => segments.push("content".to_string()),
        }
        let mut url = self.0.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.clear().extend(segments.iter().map(String::as_str));
        }
        url
    }
}

impl fmt::Display for StatusHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StatusHandle {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Url::parse(s)?))
    }
}

impl From<Url> for StatusHandle {
    fn from(url: Url) -> Self {
        Self(url)
    }
}
