//! Per-peer settings on top of the shared store, with corruption recovery.
//!
//! Keys are namespaced by the peer's full identity. When the store reports
//! corruption, the whole store is cleared once and the operation retried
//! once:
//!
//! - a write that still fails propagates the *original* error;
//! - a read that still fails degrades to `None`;
//! - any other error propagates immediately, with no recovery.
//!
//! Clearing wipes the settings of every peer in the process. Clear and
//! retry run under one lock shared by every peer of a [`SharedStore`]; a
//! peer whose failure predates another peer's recovery retries without
//! clearing again.

use std::sync::{Arc, Mutex, PoisonError};

use livesync_bridge_core::PeerIdentity;
use tracing::warn;

use crate::error::Result;
use crate::traits::SettingsStore;

/// The process-wide settings store and its recovery lock.
#[derive(Clone)]
pub struct SharedStore {
    store: Arc<dyn SettingsStore>,
    /// Number of completed clears.
    recoveries: Arc<Mutex<u64>>,
}

impl SharedStore {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            recoveries: Arc::new(Mutex::new(0)),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &dyn SettingsStore {
        self.store.as_ref()
    }

    fn recoveries(&self) -> u64 {
        *self.recoveries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op`, recovering once from corruption.
    ///
    /// Returns the first error if the clear or the retry fails.
    fn run<T>(
        &self,
        identity: &PeerIdentity,
        key: &str,
        action: &str,
        op: impl Fn(&dyn SettingsStore) -> Result<T>,
    ) -> Result<T> {
        let seen = self.recoveries();
        let err = match op(self.store()) {
            Err(err) if err.is_corruption() => err,
            other => return other,
        };
        warn!(
            peer = %identity.name,
            key,
            error = %err,
            "malformed settings store detected while {}; resetting local state",
            action
        );

        let mut recoveries = self.recoveries.lock().unwrap_or_else(PoisonError::into_inner);
        if *recoveries == seen {
            if let Err(clear_err) = self.store.clear() {
                warn!(peer = %identity.name, error = %clear_err, "failed to reset settings store");
                return Err(err);
            }
            *recoveries += 1;
        }
        op(self.store()).map_err(|_| err)
    }
}

/// One peer's view of the shared settings store.
#[derive(Clone)]
pub struct ResilientSettings {
    identity: PeerIdentity,
    shared: SharedStore,
}

impl ResilientSettings {
    /// Create settings for `identity` over the shared store.
    pub fn new(identity: PeerIdentity, shared: SharedStore) -> Self {
        Self { identity, shared }
    }

    /// The identity keys are namespaced with.
    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    /// The namespaced key actually stored for `key`.
    pub fn storage_key(&self, key: &str) -> String {
        self.identity.settings_key(key)
    }

    /// Persist `value` under `key`.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let key = self.storage_key(key);
        self.shared
            .run(&self.identity, &key, "writing", |store| store.set(&key, value))
    }

    /// Read the value under `key`.
    ///
    /// Returns `Ok(None)` when recovery from corruption did not succeed.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let key = self.storage_key(key);
        match self
            .shared
            .run(&self.identity, &key, "reading", |store| store.get(&key))
        {
            Err(err) if err.is_corruption() => Ok(None),
            other => other,
        }
    }

    /// Remove the value under `key`. Same recovery policy as writes.
    pub fn remove_setting(&self, key: &str) -> Result<()> {
        let key = self.storage_key(key);
        self.shared
            .run(&self.identity, &key, "removing", |store| store.remove(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::OnceLock;

    use crate::error::{StoreError, CORRUPTION_SIGNATURE};
    use crate::memory::MemorySettingsStore;

    fn settings(name: &str, shared: &SharedStore) -> ResilientSettings {
        ResilientSettings::new(PeerIdentity::new(name, "storage", "vault/"), shared.clone())
    }

    fn memory_shared() -> (Arc<MemorySettingsStore>, SharedStore) {
        let store = Arc::new(MemorySettingsStore::new());
        let shared = SharedStore::new(store.clone());
        (store, shared)
    }

    #[test]
    fn test_roundtrip() {
        let (store, shared) = memory_shared();
        let settings = settings("a", &shared);

        settings.set_setting("k", "v").unwrap();
        assert_eq!(settings.get_setting("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("a-storage-vault/-k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_peers_are_isolated() {
        let (_store, shared) = memory_shared();
        let a = settings("a", &shared);
        let b = settings("b", &shared);

        a.set_setting("k", "from-a").unwrap();
        assert_eq!(b.get_setting("k").unwrap(), None);

        b.set_setting("k", "from-b").unwrap();
        assert_eq!(a.get_setting("k").unwrap().as_deref(), Some("from-a"));
    }

    #[test]
    fn test_remove() {
        let (_store, shared) = memory_shared();
        let settings = settings("a", &shared);

        settings.set_setting("k", "v").unwrap();
        settings.remove_setting("k").unwrap();
        assert_eq!(settings.get_setting("k").unwrap(), None);
    }

    /// Fails the first two writes with corruption. While the first one is in
    /// flight, a second peer writes, hits the other failure and recovers.
    struct OverlappingFailures {
        inner: MemorySettingsStore,
        failing_sets: AtomicUsize,
        clears: AtomicUsize,
        interleaved: AtomicBool,
        other_peer: OnceLock<ResilientSettings>,
    }

    impl SettingsStore for OverlappingFailures {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            let failing = self
                .failing_sets
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !failing {
                return self.inner.set(key, value);
            }
            if !self.interleaved.swap(true, Ordering::SeqCst) {
                if let Some(other) = self.other_peer.get() {
                    other.set_setting("k", "from-b").unwrap();
                }
            }
            Err(StoreError::Corrupted(CORRUPTION_SIGNATURE.to_string()))
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }

        fn clear(&self) -> Result<()> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            self.inner.clear()
        }
    }

    #[test]
    fn test_overlapping_recoveries_clear_once() {
        let store = Arc::new(OverlappingFailures {
            inner: MemorySettingsStore::new(),
            failing_sets: AtomicUsize::new(2),
            clears: AtomicUsize::new(0),
            interleaved: AtomicBool::new(false),
            other_peer: OnceLock::new(),
        });
        let shared = SharedStore::new(store.clone());
        let a = settings("a", &shared);
        let _ = store.other_peer.set(settings("b", &shared));

        a.set_setting("k", "from-a").unwrap();

        // b recovered first; a's retry must not wipe b's acknowledged write.
        assert_eq!(store.clears.load(Ordering::SeqCst), 1);
        assert_eq!(a.get_setting("k").unwrap().as_deref(), Some("from-a"));
        let b = store.other_peer.get().unwrap();
        assert_eq!(b.get_setting("k").unwrap().as_deref(), Some("from-b"));
    }
}
