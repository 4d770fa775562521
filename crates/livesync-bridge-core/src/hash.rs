//! Content hashing for change deduplication.
//!
//! Wraps Blake3 with a strong type so a content digest can't be confused
//! with any other 32-byte value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker hashed in place of content when a file is deleted.
///
/// Starts with a control character so it can't collide with the
/// hash of any text a user would realistically store.
pub const DELETED_SENTINEL: &[u8] = b"\x01Deleted";

/// A 32-byte Blake3 digest of file content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Compute the hash of the given content.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// The hash recorded for a deletion.
    pub fn deleted() -> Self {
        Self::hash(DELETED_SENTINEL)
    }

    /// Leading hex digits, enough to tell hashes apart in logs.
    fn short_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(ContentHash::hash(b"hello"), ContentHash::hash(b"hello"));
        assert_ne!(ContentHash::hash(b"hello"), ContentHash::hash(b"world"));
    }

    #[test]
    fn test_deleted_differs_from_empty_content() {
        assert_ne!(ContentHash::deleted(), ContentHash::hash(b""));
        assert_eq!(ContentHash::deleted(), ContentHash::hash(DELETED_SENTINEL));
    }

    #[test]
    fn test_display_is_short_prefix() {
        let hash = ContentHash([0xab; 32]);
        assert_eq!(format!("{}", hash), "abababababababab");
        assert!(format!("{:?}", hash).starts_with("ContentHash("));
    }
}
