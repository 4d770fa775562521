//! The Hub: owns the peers and relays dispatched changes between them.
//!
//! Every change a peer dispatches is routed, in order, to every *other*
//! peer: a `put` when content is present, a `delete` otherwise.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use livesync_bridge_core::DedupConfig;
use livesync_bridge_store::{SettingsStore, SharedStore};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::{BridgeConfig, PeerConfig};
use crate::dispatch::{self, DispatchEvent, Dispatcher};
use crate::error::{BridgeError, Result};
use crate::peer::{Peer, PeerContext};
use crate::storage::{StoragePeer, STORAGE_PEER_TYPE};

/// Configuration for the Hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Limits for each peer's dedup cache.
    pub dedup: DedupConfig,
    /// Capacity of the dispatch channel.
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            dedup: DedupConfig::default(),
            channel_capacity: 1000,
        }
    }
}

/// Builds a concrete peer from its context and descriptor.
pub type PeerFactory =
    Box<dyn Fn(PeerContext, &PeerConfig) -> Result<Arc<dyn Peer>> + Send + Sync>;

/// Maps peer `type` strings to factories.
#[derive(Default)]
pub struct PeerRegistry {
    factories: HashMap<String, PeerFactory>,
}

impl PeerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the peers shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(STORAGE_PEER_TYPE, |ctx, conf| {
            Ok(Arc::new(StoragePeer::from_config(ctx, conf)) as Arc<dyn Peer>)
        });
        registry
    }

    /// Register a factory for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(PeerContext, &PeerConfig) -> Result<Arc<dyn Peer>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// Build a peer for `conf`.
    pub fn build(&self, ctx: PeerContext, conf: &PeerConfig) -> Result<Arc<dyn Peer>> {
        let factory = self
            .factories
            .get(&conf.kind)
            .ok_or_else(|| BridgeError::UnknownPeerType(conf.kind.clone()))?;
        factory(ctx, conf)
    }
}

/// The Hub.
pub struct Hub {
    peers: Vec<Arc<dyn Peer>>,
    events: mpsc::Receiver<DispatchEvent>,
}

impl Hub {
    /// Build every configured peer.
    ///
    /// Peers that can't be built are logged and skipped.
    pub fn new(
        config: &BridgeConfig,
        store: Arc<dyn SettingsStore>,
        registry: &PeerRegistry,
        hub_config: HubConfig,
    ) -> Self {
        let (tx, events) = dispatch::channel(hub_config.channel_capacity);
        let store = SharedStore::new(store);

        let mut peers = Vec::with_capacity(config.peers.len());
        for conf in &config.peers {
            let ctx = PeerContext::new(
                conf.identity(),
                store.clone(),
                Dispatcher::new(&conf.name, tx.clone()),
                hub_config.dedup,
            );
            match registry.build(ctx, conf) {
                Ok(peer) => {
                    info!(peer = %conf.name, kind = %conf.kind, "peer configured");
                    peers.push(peer);
                }
                Err(err) => {
                    error!(peer = %conf.name, kind = %conf.kind, error = %err, "could not create peer");
                }
            }
        }

        Self { peers, events }
    }

    /// The configured peers.
    pub fn peers(&self) -> &[Arc<dyn Peer>] {
        &self.peers
    }

    /// Start every peer. Failures are logged; the remaining peers still start.
    pub async fn start(&self) {
        for peer in &self.peers {
            if let Err(err) = peer.start().await {
                error!(peer = %peer.name(), error = %err, "failed to start peer");
            }
        }
    }

    /// Stop every peer.
    pub async fn stop(&self) {
        for peer in &self.peers {
            if let Err(err) = peer.stop().await {
                error!(peer = %peer.name(), error = %err, "failed to stop peer");
            }
        }
    }

    /// Route dispatched changes until `shutdown` resolves or every
    /// dispatcher is gone.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.route(event).await,
                    None => break,
                },
            }
        }
    }

    /// Deliver one change to every peer except its source.
    pub async fn route(&self, event: DispatchEvent) {
        for peer in &self.peers {
            if peer.name() == event.source {
                continue;
            }
            let delivered = match &event.data {
                Some(data) => peer.put(&event.path, data).await,
                None => peer.delete(&event.path).await,
            };
            if !delivered {
                warn!(
                    source = %event.source,
                    target = %peer.name(),
                    path = %event.path,
                    deleted = event.data.is_none(),
                    "peer did not apply change"
                );
            }
        }
    }
}
