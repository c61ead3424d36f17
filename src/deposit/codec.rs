//! The wire-format boundary for chunk payloads.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::package::{SubPackage, UnitId};

/// A chunk plus the remote ids for every out-of-chunk unit it references.
///
/// This is what a codec serializes: the chunk's own entities keep their local
/// ids, while references to units created by earlier chunks carry the ids the
/// remote service assigned to them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedChunk {
    pub chunk: SubPackage,
    pub remote_units: FxHashMap<UnitId, String>,
}

/// A chunk encoded for the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Value for the Content-Type header.
    pub content_type: String,
    /// Value for the packaging header, identifying the format to the remote.
    pub packaging: String,
    pub bytes: Vec<u8>,
}

/// Failures raised while encoding a chunk.
#[derive(Debug, Error, Diagnostic)]
pub enum CodecError {
    #[error("chunk serialization failed")]
    #[diagnostic(code(packferry::deposit::codec))]
    Serialize(#[from] serde_json::Error),

    #[error("chunk encoding failed: {message}")]
    #[diagnostic(code(packferry::deposit::codec))]
    Other { message: String },
}

impl CodecError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Serializes a resolved chunk into its deposit payload.
///
/// Real deployments implement this for their package format (zipped bags,
/// METS, whatever the endpoint ingests). The pipeline never looks inside the
/// bytes.
pub trait ChunkCodec: Send + Sync {
    fn encode(&self, chunk: &ResolvedChunk) -> Result<EncodedChunk, CodecError>;
}

/// Plain JSON codec for demos and tests.
#[derive(Clone, Debug)]
pub struct JsonChunkCodec {
    packaging: String,
}

impl Default for JsonChunkCodec {
    fn default() -> Self {
        Self {
            packaging: "urn:packferry:chunk:json:1".to_string(),
        }
    }
}

impl JsonChunkCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the packaging identifier sent with each chunk.
    #[must_use]
    pub fn with_packaging(mut self, packaging: impl Into<String>) -> Self {
        self.packaging = packaging.into();
        self
    }
}

impl ChunkCodec for JsonChunkCodec {
    fn encode(&self, chunk: &ResolvedChunk) -> Result<EncodedChunk, CodecError> {
        let bytes = serde_json::to_vec(chunk)?;
        Ok(EncodedChunk {
            content_type: "application/json".to_string(),
            packaging: self.packaging.clone(),
            bytes,
        })
    }
}
