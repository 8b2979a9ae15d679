//! Content-defined chunking with a deduplicating chunk store.
//!
//! cleaver splits a byte stream into variable-size chunks at boundaries
//! chosen by a rolling polynomial fingerprint of the content, stores each
//! chunk once under its content address, and records the split in a
//! line-oriented manifest named after the digest of the whole stream.
//! Because boundaries depend only on content and the chunking polynomial,
//! re-splitting edited or overlapping data reuses most existing chunks.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::fs::File;
//! use cleaver::Splitter;
//!
//! // Split a file into chunks under ./chunks (directory must exist).
//! let splitter = Splitter::new();
//! let source = File::open("big.bin").unwrap();
//! let manifest = splitter.split(source, "./chunks").unwrap();
//! println!("manifest: {}", manifest.path.display());
//!
//! // Put the file back together, byte for byte.
//! let manifest = Splitter::read_manifest(manifest.path).unwrap();
//! let output = File::create("restored.bin").unwrap();
//! splitter.assemble(&manifest, output).unwrap();
//! ```
//!
//! # Layout on disk
//!
//! A chunk directory is flat: one `<address>.chk` blob per distinct chunk
//! and one `<stream-digest>.manifest` per split. Chunk writes are
//! idempotent, so many splits can share one directory and deduplicate
//! against each other. Nothing is ever deleted.
//!
//! # Reproducibility
//!
//! The manifest records the chunking polynomial; feed it back via
//! [`Splitter::with_polynomial`] to reproduce the exact same boundaries on
//! the same content. [`Splitter::split_parallel`] produces a manifest
//! identical to the sequential path.

pub mod address;
pub mod chunker;
pub mod error;
pub mod hasher;
pub mod manifest;
pub mod polynomial;
pub mod splitter;
pub mod store;

// Re-exports for convenience
pub use address::{AddressError, ChunkAddress};
pub use chunker::{Chunk, Chunker};
pub use error::{Error, Result};
pub use hasher::{DigestReader, DigestSink, Hasher};
pub use manifest::{Manifest, ManifestEntry};
pub use polynomial::Pol;
pub use splitter::Splitter;
pub use store::ChunkStore;
