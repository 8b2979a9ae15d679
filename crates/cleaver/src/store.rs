//! Flat filesystem chunk store.
//!
//! One `<address>.chk` blob per distinct content address, with manifests
//! alongside as `<stream-digest>.manifest`. Writes are unconditional
//! overwrites: identical addresses carry identical bytes by construction,
//! so repeated and concurrent writes of the same chunk are harmless, and
//! re-splitting shared content deduplicates across splits for free. The
//! store only grows; there is no delete or GC path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::address::ChunkAddress;
use crate::error::{Error, Result};

/// Filename extension for chunk blobs.
pub const CHUNK_EXT: &str = "chk";

/// Filename extension for manifests.
pub const MANIFEST_EXT: &str = "manifest";

/// Handle to a chunk directory.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    dir: PathBuf,
}

impl ChunkStore {
    /// Open an existing chunk directory.
    ///
    /// The directory must already exist; creating it belongs to the caller
    /// and its absence is a configuration error, caught before any chunk
    /// is written.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(Error::MissingChunkDir(dir));
        }
        Ok(Self { dir })
    }

    /// The directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the blob for an address, whether or not it exists yet.
    pub fn chunk_path(&self, address: &ChunkAddress) -> PathBuf {
        self.dir.join(format!("{address}.{CHUNK_EXT}"))
    }

    /// Path of the manifest named after a stream digest.
    pub fn manifest_path(&self, stream_digest: &ChunkAddress) -> PathBuf {
        self.dir.join(format!("{stream_digest}.{MANIFEST_EXT}"))
    }

    /// Persist a chunk under its content address. Idempotent overwrite.
    pub fn write(&self, address: &ChunkAddress, data: &[u8]) -> Result<()> {
        fs::write(self.chunk_path(address), data)?;
        Ok(())
    }

    /// Read a chunk's bytes back. A missing blob is a hard error, not an
    /// empty result: assembly must never silently skip content.
    pub fn read(&self, address: &ChunkAddress) -> Result<Vec<u8>> {
        let path = self.chunk_path(address);
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::MissingChunk {
                address: address.clone(),
                path,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a blob exists for the address.
    pub fn contains(&self, address: &ChunkAddress) -> bool {
        self.chunk_path(address).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Hasher;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_dir_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        let result = ChunkStore::open(&missing);
        assert!(matches!(result, Err(Error::MissingChunkDir(p)) if p == missing));
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::open(temp_dir.path()).unwrap();

        let data = b"chunk payload";
        let address = Hasher::Blake3.digest(data);
        store.write(&address, data).unwrap();

        assert!(store.contains(&address));
        assert_eq!(store.read(&address).unwrap(), data);
    }

    #[test]
    fn test_write_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::open(temp_dir.path()).unwrap();

        let data = b"write me twice";
        let address = Hasher::Blake3.digest(data);
        store.write(&address, data).unwrap();
        store.write(&address, data).unwrap();

        assert_eq!(store.read(&address).unwrap(), data);
        let files = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_read_missing_chunk() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::open(temp_dir.path()).unwrap();

        let address = Hasher::Blake3.digest(b"never stored");
        let result = store.read(&address);
        assert!(matches!(result, Err(Error::MissingChunk { address: a, .. }) if a == address));
    }

    #[test]
    fn test_paths_use_fixed_naming_scheme() {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::open(temp_dir.path()).unwrap();

        let address: ChunkAddress = "00ff".parse().unwrap();
        assert!(store.chunk_path(&address).ends_with("00ff.chk"));
        assert!(store.manifest_path(&address).ends_with("00ff.manifest"));
    }
}
