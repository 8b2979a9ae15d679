//! Error taxonomy for the cleaver engine.
//!
//! Four families of failure:
//! - configuration errors (unknown hasher, missing chunk directory, bad
//!   bounds) are caught before any chunk is processed
//! - I/O errors are propagated as-is and never retried
//! - format errors come out of strict manifest parsing
//! - invariant violations are fatal programming errors in the parallel
//!   pipeline, reported through the same channel instead of aborting the
//!   process

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::address::{AddressError, ChunkAddress};

/// Errors surfaced by splitting, assembling, and manifest handling.
#[derive(Debug, Error)]
pub enum Error {
    /// Requested hasher name is not a supported variant.
    #[error("unknown hasher: {0}")]
    UnknownHasher(String),

    /// The chunk destination directory does not exist.
    ///
    /// Creating it belongs to the caller; the engine refuses to split into
    /// a directory it would have to invent.
    #[error("chunk directory does not exist: {0}")]
    MissingChunkDir(PathBuf),

    /// Rejected (min, max) chunk size bounds.
    #[error("invalid chunk bounds: min {min} must be at least the rolling window and below max {max}")]
    InvalidBounds {
        /// Requested minimum chunk size in bytes.
        min: usize,
        /// Requested maximum chunk size in bytes.
        max: usize,
    },

    /// A chunk referenced by a manifest is not in the store.
    #[error("chunk {address} missing from store: {path}")]
    MissingChunk {
        /// Address of the missing chunk.
        address: ChunkAddress,
        /// Path where the chunk file was expected.
        path: PathBuf,
    },

    /// A manifest line failed to parse. No partial manifest is accepted.
    #[error("malformed manifest line {line}: {reason}")]
    ManifestFormat {
        /// 1-based line number within the manifest file.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A polynomial string failed to parse.
    #[error("bad polynomial: {0}")]
    BadPolynomial(String),

    /// A broken internal invariant, e.g. a manifest slot filled twice.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Malformed content address.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
