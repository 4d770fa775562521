//! Store trait: the flat key/value interface behind peer settings.
//!
//! One store is shared by the whole process. Peers never talk to it
//! directly; they go through [`ResilientSettings`](crate::ResilientSettings),
//! which namespaces keys and handles corruption.

use std::sync::Arc;

use crate::error::Result;

/// Key used by the health probe. Written and removed immediately.
pub const HEALTH_CHECK_KEY: &str = "__lsb_local_storage_healthcheck__";

/// The settings store trait.
///
/// Operations are synchronous: a corruption recovery (clear + retry) must run
/// as one uninterruptible step, so no implementation may yield mid-call.
pub trait SettingsStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every value, for every peer.
    fn clear(&self) -> Result<()>;

    /// Re-establish access to the backing files after they were purged.
    ///
    /// Stores without backing files have nothing to do.
    fn reopen(&self) -> Result<()> {
        Ok(())
    }
}

impl<S: SettingsStore + ?Sized> SettingsStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }

    fn reopen(&self) -> Result<()> {
        (**self).reopen()
    }
}

/// Extension trait for common store patterns.
pub trait StoreExt: SettingsStore {
    /// Write and immediately remove [`HEALTH_CHECK_KEY`].
    fn probe(&self) -> Result<()> {
        self.set(HEALTH_CHECK_KEY, "1")?;
        self.remove(HEALTH_CHECK_KEY)
    }
}

impl<S: SettingsStore + ?Sized> StoreExt for S {}
