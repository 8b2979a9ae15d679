//! Split and assemble orchestration.
//!
//! A [`Splitter`] ties the pieces together: it runs the boundary finder
//! over a source, content-addresses each chunk, writes chunks into a
//! [`ChunkStore`], and finalizes a [`Manifest`] named after the digest of
//! the whole stream. Assembly walks a manifest and concatenates the
//! referenced chunks back into the original byte stream.
//!
//! Two split paths share one contract: `split` does everything on the
//! calling thread; `split_parallel` fans chunk hashing and writing out to
//! a scoped worker pool behind a bounded channel. Both produce the exact
//! same manifest for the same input and polynomial.

use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;
use std::thread;

use tracing::{debug, info};

use crate::address::ChunkAddress;
use crate::chunker::{Chunk, Chunker, DEFAULT_AVERAGE_BITS, WINDOW_SIZE};
use crate::error::{Error, Result};
use crate::hasher::{DigestReader, Hasher};
use crate::manifest::{Manifest, ManifestEntry};
use crate::polynomial::Pol;
use crate::store::ChunkStore;

/// Default chunk size floor: 128 MiB.
pub const DEFAULT_MIN_SIZE: usize = 128 * 1024 * 1024;

/// Default chunk size ceiling: 256 MiB.
pub const DEFAULT_MAX_SIZE: usize = 256 * 1024 * 1024;

/// Depth of the producer-to-worker chunk channel. Bounds memory to roughly
/// `depth * max_size` bytes in flight regardless of source size.
const CHUNK_QUEUE_DEPTH: usize = 10;

/// Configured split/assemble engine.
///
/// Construction draws a random chunking polynomial; pass a fixed one via
/// [`with_polynomial`](Splitter::with_polynomial) to reproduce boundaries
/// across runs. The builder methods consume and return `self`.
#[derive(Debug, Clone)]
pub struct Splitter {
    polynomial: Pol,
    hasher: Hasher,
    min_size: usize,
    max_size: usize,
    average_bits: u32,
    workers: usize,
}

impl Splitter {
    /// New splitter with a freshly drawn polynomial, BLAKE3 addressing,
    /// default bounds, and one worker per available core.
    pub fn new() -> Splitter {
        Splitter {
            polynomial: Pol::random(&mut rand::thread_rng()),
            hasher: Hasher::default(),
            min_size: DEFAULT_MIN_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            average_bits: DEFAULT_AVERAGE_BITS,
            workers: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
        }
    }

    /// Use a fixed chunking polynomial instead of a random draw.
    pub fn with_polynomial(mut self, polynomial: Pol) -> Splitter {
        self.polynomial = polynomial;
        self
    }

    /// Select the hash algorithm for chunk addresses and the stream digest.
    pub fn with_hasher(mut self, hasher: Hasher) -> Splitter {
        self.hasher = hasher;
        self
    }

    /// Override the chunk size bounds.
    ///
    /// `min` must be at least the rolling window ([`WINDOW_SIZE`] bytes)
    /// and strictly below `max`.
    pub fn with_bounds(mut self, min: usize, max: usize) -> Result<Splitter> {
        if min < WINDOW_SIZE || min >= max {
            return Err(Error::InvalidBounds { min, max });
        }
        self.min_size = min;
        self.max_size = max;
        Ok(self)
    }

    /// Override the boundary mask width (average chunk size ~2^bits bytes
    /// before the bounds clamp).
    pub fn with_average_bits(mut self, bits: u32) -> Splitter {
        self.average_bits = bits;
        self
    }

    /// Override the parallel worker pool width.
    pub fn with_workers(mut self, workers: usize) -> Splitter {
        self.workers = workers.max(1);
        self
    }

    /// The polynomial this splitter chunks with.
    pub fn polynomial(&self) -> Pol {
        self.polynomial
    }

    /// The hash algorithm this splitter addresses with.
    pub fn hasher(&self) -> Hasher {
        self.hasher
    }

    fn chunker<R: Read>(&self, source: R) -> Chunker<R> {
        Chunker::new(source, self.polynomial, self.min_size, self.max_size)
            .with_average_bits(self.average_bits)
    }

    /// Split `source` into content-defined chunks under `chunk_dir`,
    /// sequentially, and finalize the manifest there.
    pub fn split(&self, source: impl Read, chunk_dir: impl AsRef<Path>) -> Result<Manifest> {
        let store = ChunkStore::open(chunk_dir.as_ref())?;

        let tap = DigestReader::new(source, self.hasher.sink());
        let mut chunker = self.chunker(tap);
        let mut chunks = Vec::new();
        let mut total_size = 0u64;
        while let Some(chunk) = chunker.next_chunk()? {
            let address = self.hasher.digest(&chunk.data);
            store.write(&address, &chunk.data)?;
            debug!(position = chunk.position, size = chunk.len(), %address, "stored chunk");
            total_size += chunk.len() as u64;
            chunks.push(ManifestEntry {
                size: chunk.len() as u64,
                address,
            });
        }
        let stream_digest = chunker.into_inner().finalize();

        self.finish(&store, stream_digest, total_size, chunks)
    }

    /// Split `source` with a pool of worker threads hashing and writing
    /// chunks concurrently.
    ///
    /// One producer (the calling thread) runs the boundary finder and the
    /// stream digest tap, so boundaries and the digest are identical to the
    /// sequential path; only hashing and store writes fan out. Chunks hand
    /// off through a bounded channel and workers record manifest entries
    /// into position-indexed slots, so the finalized chunk list is in
    /// stream order no matter the completion order.
    pub fn split_parallel(
        &self,
        source: impl Read,
        chunk_dir: impl AsRef<Path>,
    ) -> Result<Manifest> {
        let store = ChunkStore::open(chunk_dir.as_ref())?;
        let (tx, rx) = mpsc::sync_channel::<Chunk>(CHUNK_QUEUE_DEPTH);
        let rx = Mutex::new(rx);
        let table = Mutex::new(SlotTable::default());

        let stream_digest = thread::scope(|scope| -> Result<ChunkAddress> {
            let mut handles = Vec::with_capacity(self.workers);
            for _ in 0..self.workers {
                handles.push(scope.spawn(|| self.run_worker(&store, &rx, &table)));
            }

            // Dropping `tx` when production ends is what closes the
            // channel and lets the workers run down.
            let digest = self.stream_chunks(source, tx);

            let mut worker_err = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        worker_err.get_or_insert(e);
                    }
                    Err(_) => {
                        worker_err
                            .get_or_insert(Error::Invariant("chunk worker panicked".to_string()));
                    }
                }
            }
            // A worker failure is the root cause; the producer only sees
            // its consequences.
            if let Some(e) = worker_err {
                return Err(e);
            }
            digest
        })?;

        let table = table
            .into_inner()
            .map_err(|_| Error::Invariant("slot table lock poisoned".to_string()))?;
        let (chunks, total_size) = table.into_ordered()?;

        self.finish(&store, stream_digest, total_size, chunks)
    }

    /// Producer half of the parallel path: find boundaries, tap the stream
    /// digest, hand chunks to the workers in position order.
    fn stream_chunks(&self, source: impl Read, tx: SyncSender<Chunk>) -> Result<ChunkAddress> {
        let tap = DigestReader::new(source, self.hasher.sink());
        let mut chunker = self.chunker(tap);
        while let Some(chunk) = chunker.next_chunk()? {
            if tx.send(chunk).is_err() {
                return Err(Error::Invariant(
                    "chunk channel closed before end of stream".to_string(),
                ));
            }
        }
        Ok(chunker.into_inner().finalize())
    }

    /// Worker loop: pull chunks until the channel closes.
    ///
    /// After the first failure the worker stops processing but keeps
    /// draining the channel, so the producer can never block forever on a
    /// full queue no one is reading.
    fn run_worker(
        &self,
        store: &ChunkStore,
        rx: &Mutex<Receiver<Chunk>>,
        table: &Mutex<SlotTable>,
    ) -> Result<()> {
        let mut first_err = None;
        loop {
            let next = match rx.lock() {
                Ok(guard) => guard.recv(),
                Err(_) => {
                    first_err
                        .get_or_insert(Error::Invariant("chunk channel lock poisoned".to_string()));
                    break;
                }
            };
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(_) => break,
            };
            if first_err.is_some() {
                continue;
            }
            if let Err(e) = self.process_chunk(store, chunk, table) {
                first_err = Some(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn process_chunk(&self, store: &ChunkStore, chunk: Chunk, table: &Mutex<SlotTable>) -> Result<()> {
        let address = self.hasher.digest(&chunk.data);
        store.write(&address, &chunk.data)?;
        debug!(position = chunk.position, size = chunk.len(), %address, "stored chunk");
        let entry = ManifestEntry {
            size: chunk.len() as u64,
            address,
        };
        let mut table = table
            .lock()
            .map_err(|_| Error::Invariant("slot table lock poisoned".to_string()))?;
        table.fill(chunk.position, entry)
    }

    /// Build and atomically write the manifest once all chunks are stored.
    fn finish(
        &self,
        store: &ChunkStore,
        stream_digest: ChunkAddress,
        total_size: u64,
        chunks: Vec<ManifestEntry>,
    ) -> Result<Manifest> {
        let manifest = Manifest {
            path: store.manifest_path(&stream_digest),
            polynomial: self.polynomial,
            total_size,
            stream_digest,
            chunks,
        };
        manifest.write()?;
        info!(
            digest = %manifest.stream_digest,
            chunks = manifest.chunks.len(),
            total_size = manifest.total_size,
            "split complete"
        );
        Ok(manifest)
    }

    /// Reconstruct the original byte stream described by `manifest` into
    /// `dst`.
    ///
    /// Chunks are read from the directory containing the manifest. Any
    /// missing chunk, or a chunk whose size disagrees with its manifest
    /// entry, aborts the assembly.
    pub fn assemble(&self, manifest: &Manifest, mut dst: impl Write) -> Result<()> {
        // parent() of a bare filename is Some(""), which is not openable.
        let dir = match manifest.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let store = ChunkStore::open(dir)?;

        for entry in &manifest.chunks {
            let data = store.read(&entry.address)?;
            if data.len() as u64 != entry.size {
                return Err(Error::Invariant(format!(
                    "chunk {} is {} bytes on disk, manifest says {}",
                    entry.address,
                    data.len(),
                    entry.size
                )));
            }
            dst.write_all(&data)?;
        }
        dst.flush()?;
        info!(
            digest = %manifest.stream_digest,
            chunks = manifest.chunks.len(),
            total_size = manifest.total_size,
            "assemble complete"
        );
        Ok(())
    }

    /// Load a manifest from disk.
    pub fn read_manifest(path: impl Into<PathBuf>) -> Result<Manifest> {
        Manifest::read(path)
    }
}

impl Default for Splitter {
    fn default() -> Splitter {
        Splitter::new()
    }
}

/// Stream-order accumulator for the parallel path.
///
/// Workers fill entries keyed by chunk position; the table grows on demand
/// so stream length never needs to be known up front. Filling a slot twice
/// or leaving a hole behind means the pipeline itself is broken.
#[derive(Debug, Default)]
struct SlotTable {
    slots: Vec<Option<ManifestEntry>>,
    total_size: u64,
}

impl SlotTable {
    fn fill(&mut self, position: u64, entry: ManifestEntry) -> Result<()> {
        let index = position as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        if self.slots[index].is_some() {
            return Err(Error::Invariant(format!(
                "manifest slot {position} filled twice"
            )));
        }
        self.total_size += entry.size;
        self.slots[index] = Some(entry);
        Ok(())
    }

    fn into_ordered(self) -> Result<(Vec<ManifestEntry>, u64)> {
        let total_size = self.total_size;
        let chunks = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| Error::Invariant(format!("manifest slot {i} never filled")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((chunks, total_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    const TEST_POL: Pol = Pol::new(0x3DA3358B4DC173);

    fn test_splitter() -> Splitter {
        Splitter::new()
            .with_polynomial(TEST_POL)
            .with_bounds(256, 8192)
            .unwrap()
            .with_average_bits(10)
    }

    fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        StdRng::seed_from_u64(seed).fill_bytes(&mut data);
        data
    }

    fn chunk_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref().unwrap().path().extension().and_then(|x| x.to_str()) == Some("chk")
            })
            .count()
    }

    #[test]
    fn test_split_assemble_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let data = random_bytes(1, 200_000);
        let splitter = test_splitter();

        let manifest = splitter.split(Cursor::new(data.clone()), temp_dir.path()).unwrap();
        assert!(manifest.path.exists());
        assert_eq!(manifest.total_size, data.len() as u64);
        assert!(manifest.chunks.len() > 1);
        let sum: u64 = manifest.chunks.iter().map(|c| c.size).sum();
        assert_eq!(sum, manifest.total_size);

        let mut out = Vec::new();
        splitter.assemble(&manifest, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_parallel_split_assemble_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let data = random_bytes(2, 200_000);
        let splitter = test_splitter().with_workers(3);

        let manifest = splitter
            .split_parallel(Cursor::new(data.clone()), temp_dir.path())
            .unwrap();

        let mut out = Vec::new();
        splitter.assemble(&manifest, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_parallel_manifest_matches_sequential() {
        let data = random_bytes(3, 300_000);
        let splitter = test_splitter().with_workers(4);

        let seq_dir = TempDir::new().unwrap();
        let par_dir = TempDir::new().unwrap();
        let seq = splitter.split(Cursor::new(data.clone()), seq_dir.path()).unwrap();
        let par = splitter
            .split_parallel(Cursor::new(data), par_dir.path())
            .unwrap();

        assert_eq!(seq.stream_digest, par.stream_digest);
        assert_eq!(seq.total_size, par.total_size);
        assert_eq!(seq.chunks, par.chunks);
        assert_eq!(
            fs::read_to_string(&seq.path).unwrap(),
            fs::read_to_string(&par.path).unwrap()
        );
    }

    #[test]
    fn test_single_worker_parallel_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let data = random_bytes(4, 100_000);
        let splitter = test_splitter().with_workers(1);

        let manifest = splitter
            .split_parallel(Cursor::new(data.clone()), temp_dir.path())
            .unwrap();

        let mut out = Vec::new();
        splitter.assemble(&manifest, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_empty_stream() {
        let temp_dir = TempDir::new().unwrap();
        let splitter = test_splitter();

        let manifest = splitter.split(Cursor::new(Vec::new()), temp_dir.path()).unwrap();
        assert_eq!(manifest.total_size, 0);
        assert!(manifest.chunks.is_empty());
        assert_eq!(manifest.stream_digest, Hasher::Blake3.digest(b""));
        assert!(manifest.path.exists());
        assert_eq!(chunk_files(temp_dir.path()), 0);

        let mut out = Vec::new();
        splitter.assemble(&manifest, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_stream_digest_is_whole_buffer_digest() {
        let temp_dir = TempDir::new().unwrap();
        let data = random_bytes(5, 50_000);
        let splitter = test_splitter();

        let manifest = splitter.split(Cursor::new(data.clone()), temp_dir.path()).unwrap();
        assert_eq!(manifest.stream_digest, Hasher::Blake3.digest(&data));
        assert!(manifest
            .path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with(manifest.stream_digest.as_str()));
    }

    #[test]
    fn test_sha256_addressing() {
        let temp_dir = TempDir::new().unwrap();
        let data = random_bytes(6, 50_000);
        let splitter = test_splitter().with_hasher(Hasher::Sha256);

        let manifest = splitter.split(Cursor::new(data.clone()), temp_dir.path()).unwrap();
        assert_eq!(manifest.stream_digest, Hasher::Sha256.digest(&data));

        let mut out = Vec::new();
        splitter.assemble(&manifest, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_resplit_deduplicates() {
        let temp_dir = TempDir::new().unwrap();
        let data = random_bytes(7, 150_000);
        let splitter = test_splitter();

        let first = splitter.split(Cursor::new(data.clone()), temp_dir.path()).unwrap();
        let after_first = chunk_files(temp_dir.path());
        let second = splitter.split(Cursor::new(data), temp_dir.path()).unwrap();

        assert_eq!(first.chunks, second.chunks);
        assert_eq!(chunk_files(temp_dir.path()), after_first);
    }

    #[test]
    fn test_shared_prefix_shares_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let mut a = random_bytes(8, 150_000);
        let mut b = a.clone();
        b.extend_from_slice(&random_bytes(9, 150_000));
        a.extend_from_slice(&random_bytes(10, 150_000));
        let splitter = test_splitter();

        let ma = splitter.split(Cursor::new(a), temp_dir.path()).unwrap();
        let after_a = chunk_files(temp_dir.path());
        let mb = splitter.split(Cursor::new(b), temp_dir.path()).unwrap();

        assert_ne!(ma.stream_digest, mb.stream_digest);
        // The shared 150 KB prefix chunks identically, so the second split
        // adds fewer new blobs than it has chunks.
        let added = chunk_files(temp_dir.path()) - after_a;
        assert!(added < mb.chunks.len());
    }

    #[test]
    fn test_split_into_missing_dir_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        let splitter = test_splitter();

        let result = splitter.split(Cursor::new(vec![1u8; 1000]), &missing);
        assert!(matches!(result, Err(Error::MissingChunkDir(p)) if p == missing));
        let result = splitter.split_parallel(Cursor::new(vec![1u8; 1000]), &missing);
        assert!(matches!(result, Err(Error::MissingChunkDir(_))));
    }

    #[test]
    fn test_assemble_missing_chunk_is_hard_error() {
        let temp_dir = TempDir::new().unwrap();
        let data = random_bytes(11, 100_000);
        let splitter = test_splitter();

        let manifest = splitter.split(Cursor::new(data), temp_dir.path()).unwrap();
        let victim = &manifest.chunks[manifest.chunks.len() / 2].address;
        fs::remove_file(temp_dir.path().join(format!("{victim}.chk"))).unwrap();

        let result = splitter.assemble(&manifest, Vec::new());
        assert!(matches!(result, Err(Error::MissingChunk { address, .. }) if address == *victim));
    }

    #[test]
    fn test_assemble_size_mismatch_is_hard_error() {
        let temp_dir = TempDir::new().unwrap();
        let data = random_bytes(12, 50_000);
        let splitter = test_splitter();

        let manifest = splitter.split(Cursor::new(data), temp_dir.path()).unwrap();
        let victim = &manifest.chunks[0].address;
        fs::write(temp_dir.path().join(format!("{victim}.chk")), b"truncated").unwrap();

        let result = splitter.assemble(&manifest, Vec::new());
        assert!(matches!(result, Err(Error::Invariant(_))));
    }

    #[test]
    fn test_read_manifest_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let data = random_bytes(13, 80_000);
        let splitter = test_splitter();

        let manifest = splitter.split(Cursor::new(data), temp_dir.path()).unwrap();
        let restored = Splitter::read_manifest(&manifest.path).unwrap();

        assert_eq!(restored.polynomial, manifest.polynomial);
        assert_eq!(restored.stream_digest, manifest.stream_digest);
        assert_eq!(restored.chunks, manifest.chunks);
    }

    #[test]
    fn test_bounds_validation() {
        assert!(matches!(
            Splitter::new().with_bounds(32, 8192),
            Err(Error::InvalidBounds { min: 32, max: 8192 })
        ));
        assert!(matches!(
            Splitter::new().with_bounds(8192, 8192),
            Err(Error::InvalidBounds { .. })
        ));
        assert!(Splitter::new().with_bounds(256, 257).is_ok());
    }

    #[test]
    fn test_new_draws_irreducible_polynomial() {
        let splitter = Splitter::new();
        assert_eq!(splitter.polynomial().degree(), 53);
        assert!(splitter.polynomial().irreducible());
    }

    #[test]
    fn test_slot_table_detects_double_fill() {
        let mut table = SlotTable::default();
        let entry = ManifestEntry {
            size: 10,
            address: Hasher::Blake3.digest(b"x"),
        };
        table.fill(0, entry.clone()).unwrap();
        assert!(matches!(
            table.fill(0, entry),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn test_slot_table_detects_hole() {
        let mut table = SlotTable::default();
        let entry = ManifestEntry {
            size: 10,
            address: Hasher::Blake3.digest(b"x"),
        };
        table.fill(2, entry).unwrap();
        assert!(matches!(table.into_ordered(), Err(Error::Invariant(_))));
    }
}
