//! # LiveSync Bridge
//!
//! Relays file changes between heterogeneous synchronization endpoints.
//!
//! ## Overview
//!
//! - **Peers**: one endpoint each (a local directory, a remote database...),
//!   configured by name, type and base directory
//! - **Hub**: owns the peers and forwards every change one peer observes to
//!   all the others
//! - **Settings**: per-peer persistent key/value state in a shared SQLite
//!   file that recovers from corruption by itself
//!
//! ## Key Concepts
//!
//! - **Global path**: the namespace shared by every peer.
//! - **Local path**: a global path under one peer's base directory.
//! - **Repeating change**: content a peer already saw at a path; it is
//!   neither re-dispatched nor re-applied, which breaks echo loops.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use livesync_bridge::{BridgeConfig, Hub, HubConfig, PeerRegistry};
//! use livesync_bridge::store::{SqliteSettingsStore, StorageHealthGuard};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteSettingsStore::open("dat/storage/settings.db")?);
//!     StorageHealthGuard::for_database("dat/storage", "settings.db")
//!         .ensure_healthy(store.as_ref())?;
//!
//!     let config = BridgeConfig::load_or_default("dat/config.json").await;
//!     let mut hub = Hub::new(&config, store, &PeerRegistry::with_builtin(), HubConfig::default());
//!     hub.start().await;
//!     hub.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await;
//!     hub.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `livesync_bridge::core` - Identity, paths, dedup
//! - `livesync_bridge::store` - Settings stores and health checks

pub mod config;
pub mod dispatch;
pub mod error;
pub mod hub;
pub mod peer;
pub mod storage;

// Re-export component crates
pub use livesync_bridge_core as core;
pub use livesync_bridge_store as store;

// Re-export main types for convenience
pub use config::{BridgeConfig, PeerConfig};
pub use dispatch::{DispatchEvent, Dispatcher};
pub use error::{BridgeError, Result};
pub use hub::{Hub, HubConfig, PeerFactory, PeerRegistry};
pub use peer::{LogDirection, Peer, PeerContext};
pub use storage::{StoragePeer, STORAGE_PEER_TYPE};

// Re-export commonly used core types
pub use livesync_bridge_core::{DedupConfig, FileData, PeerIdentity};
