//! A settings store that fails on demand.
//!
//! [`FaultyStore`] wraps a [`MemorySettingsStore`] and injects scripted
//! failures, counting every call so tests can assert exactly how often the
//! recovery paths touched the store.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use livesync_bridge_store::{
    MemorySettingsStore, Result, SettingsStore, StoreError, CORRUPTION_SIGNATURE,
};

/// Store operation a fault is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Set,
    Remove,
    Clear,
}

/// Kind of injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fails with a corruption error.
    Corrupt,
    /// Fails with an ordinary, non-corruption error.
    Other,
}

impl Fault {
    fn into_error(self) -> StoreError {
        match self {
            Fault::Corrupt => StoreError::Corrupted(CORRUPTION_SIGNATURE.to_string()),
            Fault::Other => StoreError::Unavailable("injected failure".to_string()),
        }
    }
}

/// Fault-injecting settings store.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemorySettingsStore,
    scripted: Mutex<HashMap<Op, VecDeque<Fault>>>,
    corrupt_until_reopen: AtomicBool,
    always_corrupt: AtomicBool,
    gets: AtomicUsize,
    sets: AtomicUsize,
    removes: AtomicUsize,
    clears: AtomicUsize,
    reopens: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `op` with `fault`. Calls queue up in order.
    pub fn fail_next(&self, op: Op, fault: Fault) -> &Self {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_default()
            .push_back(fault);
        self
    }

    /// Report corruption on every call until [`SettingsStore::reopen`].
    pub fn corrupt_until_reopen(&self) -> &Self {
        self.corrupt_until_reopen.store(true, Ordering::SeqCst);
        self
    }

    /// Report corruption on every call, forever.
    pub fn corrupt_forever(&self) -> &Self {
        self.always_corrupt.store(true, Ordering::SeqCst);
        self
    }

    /// The wrapped store, bypassing fault injection.
    pub fn inner(&self) -> &MemorySettingsStore {
        &self.inner
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn reopens(&self) -> usize {
        self.reopens.load(Ordering::SeqCst)
    }

    fn check(&self, op: Op, counter: &AtomicUsize) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.always_corrupt.load(Ordering::SeqCst)
            || self.corrupt_until_reopen.load(Ordering::SeqCst)
        {
            return Err(Fault::Corrupt.into_error());
        }
        let fault = self
            .scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(fault) => Err(fault.into_error()),
            None => Ok(()),
        }
    }
}

impl SettingsStore for FaultyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check(Op::Get, &self.gets)?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check(Op::Set, &self.sets)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check(Op::Remove, &self.removes)?;
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<()> {
        self.check(Op::Clear, &self.clears)?;
        self.inner.clear()
    }

    fn reopen(&self) -> Result<()> {
        self.reopens.fetch_add(1, Ordering::SeqCst);
        self.corrupt_until_reopen.store(false, Ordering::SeqCst);
        Ok(())
    }
}
