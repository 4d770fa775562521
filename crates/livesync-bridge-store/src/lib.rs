//! # LiveSync Bridge Store
//!
//! Settings persistence for bridge peers. Provides a trait-based key/value
//! interface with SQLite and in-memory implementations, per-peer namespacing
//! with one-shot corruption recovery, and the startup health guard.
//!
//! ## Key Types
//!
//! - [`SettingsStore`] - The flat key/value trait shared by the process
//! - [`SqliteSettingsStore`] - SQLite-based persistent storage
//! - [`MemorySettingsStore`] - In-memory storage for tests
//! - [`SharedStore`] - The process-wide store with its recovery lock
//! - [`ResilientSettings`] - One peer's namespaced view with recovery
//! - [`StorageHealthGuard`] - Startup probe and corrupt-file purge
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use livesync_bridge_core::PeerIdentity;
//! use livesync_bridge_store::{
//!     ResilientSettings, SharedStore, SqliteSettingsStore, StorageHealthGuard,
//! };
//!
//! fn example() -> livesync_bridge_store::Result<()> {
//!     let store = Arc::new(SqliteSettingsStore::open("dat/storage/settings.db")?);
//!     StorageHealthGuard::new("dat/storage").ensure_healthy(store.as_ref())?;
//!
//!     let shared = SharedStore::new(store);
//!     let settings = ResilientSettings::new(PeerIdentity::new("vault", "storage", "vault/"), shared);
//!     settings.set_setting("since", "1700000000000")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Typed corruption**: SQLite `CORRUPT`/`NOTADB` failures become [`StoreError::Corrupted`]
//! - **At most one recovery per call**: a store-wide clear, then a single retry
//! - **Reads degrade, writes fail**: see [`ResilientSettings`]

pub mod error;
pub mod health;
pub mod memory;
pub mod migration;
pub mod settings;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError, CORRUPTION_SIGNATURE};
pub use health::{HealthReport, StorageHealthGuard};
pub use memory::MemorySettingsStore;
pub use settings::{ResilientSettings, SharedStore};
pub use sqlite::{SqliteSettingsStore, SETTINGS_DB_FILE};
pub use traits::{SettingsStore, StoreExt, HEALTH_CHECK_KEY};
