//! ChunkAddress: the hex-rendered content digest of a chunk.
//!
//! An address serves double duty: it is the deduplication key and the
//! filename stem of the stored blob (`<address>.chk`). Two chunks with
//! identical bytes always get the same address; there is no nonce or salt.
//! The width depends on the selected hash algorithm (64 hex chars for both
//! built-in variants), so validation checks shape, not a fixed length.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A content address - the lowercase hex digest of a chunk's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkAddress(String);

/// Errors that can occur when parsing content addresses.
#[derive(Debug, Error)]
pub enum AddressError {
    /// The address string was empty.
    #[error("empty content address")]
    Empty,

    /// Hex strings encode whole bytes, so the length must be even.
    #[error("odd-length content address: {0} hex chars")]
    OddLength(usize),

    /// A non-hex character appeared in the address.
    #[error("invalid hex character in content address")]
    InvalidHex,
}

impl ChunkAddress {
    /// Wrap a raw digest as an address.
    pub(crate) fn from_digest(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Create from an existing address string (validates format).
    pub fn from_str_checked(s: &str) -> Result<Self, AddressError> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        if s.len() % 2 != 0 {
            return Err(AddressError::OddLength(s.len()));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidHex);
        }
        Ok(Self(s.to_lowercase()))
    }

    /// Get the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ChunkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChunkAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_checked(s)
    }
}

impl AsRef<str> for ChunkAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_digest_renders_hex() {
        let addr = ChunkAddress::from_digest(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(addr.as_str(), "deadbeef");
    }

    #[test]
    fn test_from_str_valid() {
        let s = "ab34ef0102";
        let addr: ChunkAddress = s.parse().unwrap();
        assert_eq!(addr.as_str(), s);
    }

    #[test]
    fn test_from_str_lowercases() {
        let addr: ChunkAddress = "DEADBEEF".parse().unwrap();
        assert_eq!(addr.as_str(), "deadbeef");
    }

    #[test]
    fn test_from_str_empty() {
        let result: Result<ChunkAddress, _> = "".parse();
        assert!(matches!(result, Err(AddressError::Empty)));
    }

    #[test]
    fn test_from_str_odd_length() {
        let result: Result<ChunkAddress, _> = "abc".parse();
        assert!(matches!(result, Err(AddressError::OddLength(3))));
    }

    #[test]
    fn test_from_str_invalid_hex() {
        let result: Result<ChunkAddress, _> = "zzzz".parse();
        assert!(matches!(result, Err(AddressError::InvalidHex)));
    }

    #[test]
    fn test_serde_roundtrip() {
        let addr = ChunkAddress::from_digest(b"serde test");
        let json = serde_json::to_string(&addr).unwrap();
        let restored: ChunkAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, restored);
    }

    #[test]
    fn test_display() {
        let addr = ChunkAddress::from_digest(&[1, 2, 3]);
        assert_eq!(format!("{}", addr), addr.as_str());
    }
}
