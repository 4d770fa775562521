//! An in-memory peer that records what the hub asked of it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use livesync_bridge::{Peer, PeerContext, Result};
use livesync_bridge_core::FileData;

/// One call received from the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOp {
    Put { path: String, data: FileData },
    Delete { path: String },
}

impl RecordedOp {
    pub fn path(&self) -> &str {
        match self {
            RecordedOp::Put { path, .. } | RecordedOp::Delete { path } => path,
        }
    }
}

/// Peer backed by a map, recording every `put` and `delete`.
pub struct RecordingPeer {
    ctx: PeerContext,
    files: Mutex<BTreeMap<String, FileData>>,
    ops: Mutex<Vec<RecordedOp>>,
    accept: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl RecordingPeer {
    pub fn new(ctx: PeerContext) -> Self {
        Self {
            ctx,
            files: Mutex::new(BTreeMap::new()),
            ops: Mutex::new(Vec::new()),
            accept: AtomicBool::new(true),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    /// Make subsequent `put`/`delete` calls report failure.
    pub fn reject_changes(&self) {
        self.accept.store(false, Ordering::SeqCst);
    }

    /// Calls received so far.
    pub fn ops(&self) -> Vec<RecordedOp> {
        lock(&self.ops).clone()
    }

    /// Current content at a global path.
    pub fn file(&self, path: &str) -> Option<FileData> {
        lock(&self.files).get(path).cloned()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Simulate a change made directly in this peer's backend.
    ///
    /// Dispatches it unless it repeats what the peer last saw; returns
    /// whether it was dispatched.
    pub async fn observe(&self, path: &str, data: Option<FileData>) -> Result<bool> {
        match &data {
            Some(data) => lock(&self.files).insert(path.to_string(), data.clone()),
            None => lock(&self.files).remove(path),
        };
        if self.ctx.is_repeating(path, data.as_ref()) {
            return Ok(false);
        }
        self.ctx.send_log(path);
        self.ctx.dispatch(path, data).await?;
        Ok(true)
    }
}

#[async_trait]
impl Peer for RecordingPeer {
    fn context(&self) -> &PeerContext {
        &self.ctx
    }

    async fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, path: &str) -> Option<FileData> {
        self.file(path)
    }

    async fn put(&self, path: &str, data: &FileData) -> bool {
        lock(&self.ops).push(RecordedOp::Put {
            path: path.to_string(),
            data: data.clone(),
        });
        if !self.accept.load(Ordering::SeqCst) {
            return false;
        }
        self.ctx.receive_log(path);
        lock(&self.files).insert(path.to_string(), data.clone());
        // Content arriving from the hub must not echo back.
        self.ctx.mark_seen(path, Some(data));
        true
    }

    async fn delete(&self, path: &str) -> bool {
        lock(&self.ops).push(RecordedOp::Delete {
            path: path.to_string(),
        });
        if !self.accept.load(Ordering::SeqCst) {
            return false;
        }
        lock(&self.files).remove(path);
        self.ctx.mark_seen(path, None);
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
