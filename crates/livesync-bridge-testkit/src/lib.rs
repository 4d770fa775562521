//! # LiveSync Bridge Testkit
//!
//! Testing utilities for the LiveSync bridge.
//!
//! ## Overview
//!
//! - **Faulty store**: a settings store with scripted corruption and call counters
//! - **Recording peer**: an in-memory peer that records hub deliveries
//! - **Generators**: Proptest strategies for paths and base directories
//! - **Fixtures**: identities, contexts and file data
//!
//! ## Fault Injection
//!
//! ```rust
//! use livesync_bridge_testkit::{Fault, FaultyStore, Op};
//! use livesync_bridge_store::SettingsStore;
//!
//! let store = FaultyStore::new();
//! store.fail_next(Op::Set, Fault::Corrupt);
//! assert!(store.set("k", "v").is_err());
//! assert!(store.set("k", "v").is_ok());
//! ```

pub mod faulty;
pub mod fixtures;
pub mod generators;
pub mod peers;

pub use faulty::{Fault, FaultyStore, Op};
pub use fixtures::{file_data, identity, memory_store, test_context, TEST_PEER_TYPE};
pub use peers::{RecordedOp, RecordingPeer};
