//! Chunk submission: codec boundary, deposit endpoint client, and the
//! submitter that resolves cross-chunk references.
//!
//! The deposit endpoint itself lives outside this crate. [`DepositClient`] is
//! the seam; [`HttpDepositClient`] is the shipped reqwest adapter, and tests
//! script their own implementations. Encoding a chunk to its wire form is the
//! caller's domain too, behind [`ChunkCodec`]; [`JsonChunkCodec`] covers
//! demos and tests.

pub mod client;
pub mod codec;
pub mod submitter;

pub use client::{CreatedIds, DepositClient, DepositError, DepositReceipt, HttpDepositClient};
pub use codec::{ChunkCodec, CodecError, EncodedChunk, JsonChunkCodec, ResolvedChunk};
pub use submitter::{ChunkSubmitter, SubmitError};
