//! The peer abstraction.
//!
//! A [`Peer`] is one synchronization endpoint. Backend-specific behaviour
//! lives in the trait implementation; everything every peer must do the same
//! way (path translation, deduplication, settings, logging, dispatching)
//! lives in the composed [`PeerContext`].
//!
//! The hub passes global paths to [`Peer::get`], [`Peer::put`] and
//! [`Peer::delete`]; implementations translate with
//! [`PeerContext::to_local_path`] before touching their backend, and with
//! [`PeerContext::to_global_path`] before dispatching.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use livesync_bridge_core::{
    compare_date, ChangeDedupCache, DedupConfig, FileData, PathTranslator, PeerIdentity,
};
use livesync_bridge_store::{ResilientSettings, SharedStore};
use tracing::Level;

use crate::dispatch::Dispatcher;
use crate::error::Result;

/// One synchronization endpoint.
///
/// `start` and `stop` should be idempotent and report failure through their
/// result. `get`, `put` and `delete` report ordinary backend failures as
/// `None`/`false` so the hub can decide what to do.
#[async_trait]
pub trait Peer: Send + Sync {
    /// Shared helpers for this peer.
    fn context(&self) -> &PeerContext;

    /// The peer's configured name.
    fn name(&self) -> &str {
        &self.context().identity().name
    }

    /// Connect to the backend and begin observing changes.
    async fn start(&self) -> Result<()>;

    /// Stop observing changes and release the backend.
    async fn stop(&self) -> Result<()>;

    /// Read the file at a global path.
    async fn get(&self, path: &str) -> Option<FileData>;

    /// Write `data` at a global path.
    async fn put(&self, path: &str, data: &FileData) -> bool;

    /// Delete the file at a global path.
    async fn delete(&self, path: &str) -> bool;
}

/// Direction marker used in peer log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDirection {
    /// Received from the hub: `<--`.
    Received,
    /// Sent to the hub: `-->`.
    Sent,
    /// Internal.
    Internal,
}

impl LogDirection {
    fn marker(self) -> &'static str {
        match self {
            LogDirection::Received => "<-- ",
            LogDirection::Sent => "--> ",
            LogDirection::Internal => "",
        }
    }
}

/// State and helpers shared by every peer implementation.
pub struct PeerContext {
    identity: PeerIdentity,
    translator: PathTranslator,
    dedup: Mutex<ChangeDedupCache>,
    settings: ResilientSettings,
    dispatcher: Dispatcher,
}

impl PeerContext {
    /// Build the context for `identity`.
    pub fn new(
        identity: PeerIdentity,
        store: SharedStore,
        dispatcher: Dispatcher,
        dedup: DedupConfig,
    ) -> Self {
        Self {
            translator: PathTranslator::new(identity.base_dir.clone()),
            dedup: Mutex::new(ChangeDedupCache::new(dedup)),
            settings: ResilientSettings::new(identity.clone(), store),
            identity,
            dispatcher,
        }
    }

    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    pub fn translator(&self) -> &PathTranslator {
        &self.translator
    }

    pub fn to_local_path(&self, global_path: &str) -> String {
        self.translator.to_local_path(global_path)
    }

    pub fn to_global_path(&self, local_path: &str) -> String {
        self.translator.to_global_path(local_path)
    }

    /// Whether `data` (or a deletion) repeats what was last seen at `path`.
    ///
    /// Hashing and the cache update happen under one lock with no await in
    /// between, so concurrent changes to the same path are ordered.
    pub fn is_repeating(&self, path: &str, data: Option<&FileData>) -> bool {
        self.dedup().is_repeating(path, data)
    }

    /// Whether `data` (or a deletion) is already what this peer holds at
    /// `path`. Nothing is recorded.
    pub fn has_seen(&self, path: &str, data: Option<&FileData>) -> bool {
        self.dedup().is_current(path, data)
    }

    /// Record `data` (or a deletion) as applied at `path`, once the backend
    /// actually holds it.
    pub fn mark_seen(&self, path: &str, data: Option<&FileData>) {
        self.dedup().record(path, data);
    }

    fn dedup(&self) -> MutexGuard<'_, ChangeDedupCache> {
        self.dedup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compare modification times at whole-second granularity.
    pub fn compare_date(&self, a: Option<&FileData>, b: Option<&FileData>) -> i64 {
        compare_date(a, b)
    }

    pub fn get_setting(&self, key: &str) -> livesync_bridge_store::Result<Option<String>> {
        self.settings.get_setting(key)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> livesync_bridge_store::Result<()> {
        self.settings.set_setting(key, value)
    }

    pub fn remove_setting(&self, key: &str) -> livesync_bridge_store::Result<()> {
        self.settings.remove_setting(key)
    }

    /// Hand a change at a global path to the hub.
    pub async fn dispatch(&self, global_path: &str, data: Option<FileData>) -> Result<()> {
        self.dispatcher.dispatch(global_path, data).await
    }

    /// Log a change received from the hub, at INFO.
    pub fn receive_log(&self, message: impl fmt::Display) {
        self.log(LogDirection::Received, Level::INFO, message);
    }

    /// Log a change sent to the hub, at INFO.
    pub fn send_log(&self, message: impl fmt::Display) {
        self.log(LogDirection::Sent, Level::INFO, message);
    }

    /// Log an internal event, at INFO.
    pub fn normal_log(&self, message: impl fmt::Display) {
        self.log(LogDirection::Internal, Level::INFO, message);
    }

    /// Log an internal event, at DEBUG.
    pub fn debug_log(&self, message: impl fmt::Display) {
        self.log(LogDirection::Internal, Level::DEBUG, message);
    }

    /// Log `[name] <marker>message` at `level`.
    pub fn log(&self, direction: LogDirection, level: Level, message: impl fmt::Display) {
        let name = self.identity.name.as_str();
        let marker = direction.marker();
        if level == Level::ERROR {
            tracing::error!(peer = name, "[{}] {}{}", name, marker, message);
        } else if level == Level::WARN {
            tracing::warn!(peer = name, "[{}] {}{}", name, marker, message);
        } else if level == Level::INFO {
            tracing::info!(peer = name, "[{}] {}{}", name, marker, message);
        } else if level == Level::DEBUG {
            tracing::debug!(peer = name, "[{}] {}{}", name, marker, message);
        } else {
            tracing::trace!(peer = name, "[{}] {}{}", name, marker, message);
        }
    }
}

impl fmt::Debug for PeerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerContext")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch;
    use livesync_bridge_store::MemorySettingsStore;
    use std::sync::Arc;

    fn context(name: &str, base_dir: &str) -> (PeerContext, tokio::sync::mpsc::Receiver<crate::DispatchEvent>) {
        let (tx, rx) = dispatch::channel(8);
        let store = SharedStore::new(Arc::new(MemorySettingsStore::new()));
        let ctx = PeerContext::new(
            PeerIdentity::new(name, "test", base_dir),
            store,
            Dispatcher::new(name, tx),
            DedupConfig::default(),
        );
        (ctx, rx)
    }

    #[test]
    fn test_translation_uses_base_dir() {
        let (ctx, _rx) = context("a", "vault/");
        assert_eq!(ctx.to_local_path("x.md"), "vault/x.md");
        assert_eq!(ctx.to_global_path("vault/x.md"), "x.md");
    }

    #[test]
    fn test_is_repeating_per_context() {
        let (a, _rx_a) = context("a", "");
        let (b, _rx_b) = context("b", "");
        let data = FileData::new(b"same".to_vec(), 0, 0);

        assert!(!a.is_repeating("x", Some(&data)));
        assert!(a.is_repeating("x", Some(&data)));
        assert!(!b.is_repeating("x", Some(&data)));
    }

    #[test]
    fn test_has_seen_only_after_mark() {
        let (ctx, _rx) = context("a", "");
        let data = FileData::new(b"body".to_vec(), 0, 0);

        assert!(!ctx.has_seen("x", Some(&data)));
        assert!(!ctx.has_seen("x", Some(&data)));
        ctx.mark_seen("x", Some(&data));
        assert!(ctx.has_seen("x", Some(&data)));
        assert!(ctx.is_repeating("x", Some(&data)));
    }

    #[test]
    fn test_settings_are_namespaced() {
        let (ctx, _rx) = context("a", "vault/");
        ctx.set_setting("k", "v").unwrap();
        assert_eq!(ctx.get_setting("k").unwrap().as_deref(), Some("v"));
        ctx.remove_setting("k").unwrap();
        assert_eq!(ctx.get_setting("k").unwrap(), None);
    }

    #[tokio::test]
    async fn test_dispatch_is_tagged_with_source() {
        let (ctx, mut rx) = context("a", "");
        let data = FileData::new(b"body".to_vec(), 1, 2);

        ctx.dispatch("x.md", Some(data.clone())).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, "a");
        assert_eq!(event.data, Some(data));
    }

    #[test]
    fn test_log_helpers_do_not_panic() {
        let (ctx, _rx) = context("a", "");
        ctx.receive_log("x.md");
        ctx.send_log("x.md");
        ctx.normal_log("started");
        ctx.debug_log("details");
        ctx.log(LogDirection::Internal, Level::TRACE, "trace");
    }
}
