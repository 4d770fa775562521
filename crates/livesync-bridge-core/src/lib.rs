//! # LiveSync Bridge Core
//!
//! Pure primitives shared by every bridge peer: identity, path translation,
//! and change deduplication.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`PeerIdentity`] - The `(name, type, baseDir)` triple naming a peer
//! - [`FileData`] - One file's content and timestamps
//! - [`PathTranslator`] - Local ↔ global path mapping
//! - [`ChangeDedupCache`] - Bounded LRU of last-seen content hashes
//! - [`ContentHash`] - Blake3 digest of file content

pub mod dedup;
pub mod hash;
pub mod path;
pub mod types;

pub use dedup::{ChangeDedupCache, DedupConfig};
pub use hash::{ContentHash, DELETED_SENTINEL};
pub use path::{join_posix, normalize_posix, PathTranslator, RESERVED_PREFIX};
pub use types::{compare_date, FileData, PeerIdentity};
