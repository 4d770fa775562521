//! Change deduplication: suppress dispatching content a peer has already seen.
//!
//! Each peer remembers the content hash last observed for every path it
//! touched, in a least-recently-used cache bounded both by entry count and
//! by aggregate weight. A deletion is recorded as the hash of
//! [`DELETED_SENTINEL`](crate::hash::DELETED_SENTINEL), so "deleted" is a
//! state that dedups like any other.

use lru::LruCache;

use crate::hash::ContentHash;
use crate::types::FileData;

/// Weight charged for one cached entry: the length of its hex digest.
const ENTRY_WEIGHT: usize = 64;

/// Limits for a [`ChangeDedupCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupConfig {
    /// Maximum number of paths tracked.
    pub capacity: usize,
    /// Maximum aggregate weight of tracked entries.
    pub max_weight: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: 300,
            max_weight: 10_000_000,
        }
    }
}

/// Path → last-seen content hash, evicting least-recently-used entries.
pub struct ChangeDedupCache {
    entries: LruCache<String, ContentHash>,
    config: DedupConfig,
    weight: usize,
}

impl ChangeDedupCache {
    /// Create an empty cache with the given limits.
    pub fn new(config: DedupConfig) -> Self {
        Self {
            entries: LruCache::unbounded(),
            config,
            weight: 0,
        }
    }

    /// Check whether `data` (or a deletion, for `None`) repeats the last
    /// content seen at `path`.
    ///
    /// Returns `true` when the caller should suppress the change. Otherwise
    /// the new hash is recorded and `false` is returned, so two identical
    /// calls in a row always yield `false` then `true`.
    pub fn is_repeating(&mut self, path: &str, data: Option<&FileData>) -> bool {
        let hash = hash_of(data);

        // `get` refreshes recency on a hit.
        if self.entries.get(path) == Some(&hash) {
            return true;
        }

        self.insert(path, hash);
        false
    }

    /// Whether `data` (or a deletion) is what was last recorded at `path`.
    ///
    /// Unlike [`is_repeating`](Self::is_repeating), nothing is recorded and
    /// recency is untouched.
    pub fn is_current(&self, path: &str, data: Option<&FileData>) -> bool {
        self.entries.peek(path) == Some(&hash_of(data))
    }

    /// Record `data` (or a deletion) as the last content seen at `path`.
    pub fn record(&mut self, path: &str, data: Option<&FileData>) {
        self.insert(path, hash_of(data));
    }

    /// Record `hash` for `path` and evict until within limits.
    pub fn insert(&mut self, path: &str, hash: ContentHash) {
        if self.entries.put(path.to_string(), hash).is_none() {
            self.weight += ENTRY_WEIGHT;
        }
        self.evict();
    }

    /// Last hash seen for `path`, without touching recency.
    pub fn peek(&self, path: &str) -> Option<&ContentHash> {
        self.entries.peek(path)
    }

    /// Whether `path` is currently tracked, without touching recency.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains(path)
    }

    /// Number of tracked paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aggregate weight of tracked entries.
    pub fn weight(&self) -> usize {
        self.weight
    }

    fn evict(&mut self) {
        while self.entries.len() > self.config.capacity || self.weight > self.config.max_weight {
            match self.entries.pop_lru() {
                Some(_) => self.weight -= ENTRY_WEIGHT,
                None => break,
            }
        }
    }
}

fn hash_of(data: Option<&FileData>) -> ContentHash {
    data.map_or_else(ContentHash::deleted, FileData::content_hash)
}

impl Default for ChangeDedupCache {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}
