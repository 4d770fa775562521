//! Strong type definitions for the bridge.
//!
//! A peer is identified by its `(name, type, base_dir)` triple, and file
//! changes travel between peers as [`FileData`] units.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::ContentHash;

/// Immutable identity of one synchronization endpoint.
///
/// Every persisted setting is namespaced by the full identity, so two peers
/// sharing a base directory never see each other's keys.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerIdentity {
    /// Operator-chosen peer name, unique within a config.
    pub name: String,
    /// Backend type, e.g. `"storage"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Root of this peer's namespace.
    pub base_dir: String,
}

impl PeerIdentity {
    /// Create a new identity.
    pub fn new(name: impl Into<String>, kind: impl Into<String>, base_dir: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            base_dir: base_dir.into(),
        }
    }

    /// Namespace a settings key: `{name}-{type}-{baseDir}-{key}`.
    pub fn settings_key(&self, key: &str) -> String {
        format!("{}-{}-{}-{}", self.name, self.kind, self.base_dir, key)
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({}:{}@{:?})", self.name, self.kind, self.base_dir)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One file's content plus the metadata the bridge needs.
///
/// Times are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub ctime: i64,
    pub mtime: i64,
    pub size: u64,
    pub data: Bytes,
}

impl FileData {
    /// Create file data from content and timestamps; `size` is taken from the content.
    pub fn new(data: impl Into<Bytes>, ctime: i64, mtime: i64) -> Self {
        let data = data.into();
        Self {
            ctime,
            mtime,
            size: data.len() as u64,
            data,
        }
    }

    /// Hash of the content.
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::hash(&self.data)
    }
}

/// Compare two modification times at whole-second granularity.
///
/// Sub-second precision is dropped so backends that round or serialize
/// timestamps differently don't look like conflicting edits. A missing side
/// counts as time zero. Truncation is toward zero.
pub fn compare_date(a: Option<&FileData>, b: Option<&FileData>) -> i64 {
    let a_secs = a.map_or(0, |d| d.mtime) / 1000;
    let b_secs = b.map_or(0, |d| d.mtime) / 1000;
    a_secs - b_secs
}
