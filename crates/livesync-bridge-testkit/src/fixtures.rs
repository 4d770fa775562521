//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use bytes::Bytes;
use livesync_bridge::dispatch::{self, DispatchEvent, Dispatcher};
use livesync_bridge::PeerContext;
use livesync_bridge_core::{DedupConfig, FileData, PeerIdentity};
use livesync_bridge_store::{MemorySettingsStore, SettingsStore, SharedStore};
use tokio::sync::mpsc;

/// Peer type used by test peers.
pub const TEST_PEER_TYPE: &str = "recording";

/// Identity of a test peer.
pub fn identity(name: &str, base_dir: &str) -> PeerIdentity {
    PeerIdentity::new(name, TEST_PEER_TYPE, base_dir)
}

/// File data with the given content, stamped at `mtime`.
pub fn file_data(content: &str, mtime: i64) -> FileData {
    FileData::new(Bytes::copy_from_slice(content.as_bytes()), mtime, mtime)
}

/// A shared in-memory settings store.
pub fn memory_store() -> Arc<dyn SettingsStore> {
    Arc::new(MemorySettingsStore::new())
}

/// A peer context over `store`, with its own dispatch channel.
pub fn test_context(
    name: &str,
    base_dir: &str,
    store: SharedStore,
) -> (PeerContext, mpsc::Receiver<DispatchEvent>) {
    let (tx, rx) = dispatch::channel(64);
    let ctx = PeerContext::new(
        identity(name, base_dir),
        store,
        Dispatcher::new(name, tx),
        DedupConfig::default(),
    );
    (ctx, rx)
}
