//! Line-oriented manifest codec.
//!
//! ```text
//! 0x<polynomial> <total-size> <stream-digest>
//! <chunk-size> <chunk-address>
//! <chunk-size> <chunk-address>
//! ...
//! ```
//!
//! The header carries everything needed to reproduce the split (the
//! polynomial) and to verify reassembly (total size and the whole-stream
//! digest); chunk lines follow in stream order. Parsing is strict: any
//! malformed line fails the whole read, no silent skipping.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use tracing::debug;

use crate::address::ChunkAddress;
use crate::error::{Error, Result};
use crate::polynomial::Pol;

/// One `(size, address)` pair, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Chunk length in bytes.
    pub size: u64,
    /// Content address of the chunk.
    pub address: ChunkAddress,
}

/// The durable, reproducible description of one split.
///
/// Created atomically at the end of a successful split, read back in full
/// before any assembly, never mutated after creation. The manifest file is
/// named after `stream_digest`.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Where this manifest lives; assembly reads chunks from its parent
    /// directory.
    pub path: PathBuf,
    /// Polynomial that produced the chunk boundaries. Assembly never needs
    /// it, but a re-split of the same content does.
    pub polynomial: Pol,
    /// Sum of all chunk sizes = original stream length.
    pub total_size: u64,
    /// Digest of the original byte stream, not of the chunk list.
    pub stream_digest: ChunkAddress,
    /// Ordered chunk sequence.
    pub chunks: Vec<ManifestEntry>,
}

fn malformed(line: usize, reason: impl Into<String>) -> Error {
    Error::ManifestFormat {
        line,
        reason: reason.into(),
    }
}

impl Manifest {
    /// Read and fully parse a manifest file.
    pub fn read(path: impl Into<PathBuf>) -> Result<Manifest> {
        let path = path.into();
        let reader = BufReader::new(File::open(&path)?);
        let mut lines = reader.lines();

        let header = lines
            .next()
            .ok_or_else(|| malformed(1, "empty manifest"))??;
        let mut fields = header.split_whitespace();
        let (pol, total, digest) = match (fields.next(), fields.next(), fields.next(), fields.next())
        {
            (Some(p), Some(t), Some(d), None) => (p, t, d),
            _ => {
                return Err(malformed(
                    1,
                    "expected `<polynomial> <total-size> <stream-digest>`",
                ))
            }
        };
        let polynomial: Pol = pol
            .parse()
            .map_err(|_| malformed(1, format!("bad polynomial `{pol}`")))?;
        let total_size: u64 = total
            .parse()
            .map_err(|_| malformed(1, format!("bad total size `{total}`")))?;
        let stream_digest = ChunkAddress::from_str_checked(digest)
            .map_err(|e| malformed(1, format!("bad stream digest: {e}")))?;

        let mut chunks = Vec::new();
        for (i, line) in lines.enumerate() {
            let line_no = i + 2;
            let line = line?;
            let mut fields = line.split_whitespace();
            let (size, address) = match (fields.next(), fields.next(), fields.next()) {
                (Some(s), Some(a), None) => (s, a),
                _ => return Err(malformed(line_no, "expected `<size> <address>`")),
            };
            let size: u64 = size
                .parse()
                .map_err(|_| malformed(line_no, format!("bad chunk size `{size}`")))?;
            let address = ChunkAddress::from_str_checked(address)
                .map_err(|e| malformed(line_no, format!("bad chunk address: {e}")))?;
            chunks.push(ManifestEntry { size, address });
        }

        Ok(Manifest {
            path,
            polynomial,
            total_size,
            stream_digest,
            chunks,
        })
    }

    /// Write the manifest to its final path.
    ///
    /// Serialized to a sibling temp file first and renamed into place, so
    /// the final path either holds a complete manifest or nothing.
    pub fn write(&self) -> Result<()> {
        let tmp = self.path.with_extension("manifest.tmp");
        {
            let mut w = BufWriter::new(File::create(&tmp)?);
            writeln!(
                w,
                "{} {} {}",
                self.polynomial, self.total_size, self.stream_digest
            )?;
            for entry in &self.chunks {
                writeln!(w, "{} {}", entry.size, entry.address)?;
            }
            w.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(
            path = %self.path.display(),
            chunks = self.chunks.len(),
            total_size = self.total_size,
            "wrote manifest"
        );
        Ok(())
    }
}
