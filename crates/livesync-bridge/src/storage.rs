//! Local-filesystem peer.
//!
//! Mirrors a directory tree. Incoming changes are written under `root`;
//! outgoing changes are found by scanning the tree for files whose
//! modification time differs from the last recorded one. The recorded
//! times survive restarts as the `known-files` setting.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use livesync_bridge_core::FileData;
use tokio::task::JoinHandle;

use crate::config::PeerConfig;
use crate::error::{BridgeError, Result};
use crate::peer::{Peer, PeerContext};

/// Peer `type` for [`StoragePeer`].
pub const STORAGE_PEER_TYPE: &str = "storage";

const KNOWN_FILES_KEY: &str = "known-files";

/// Peer backed by a local directory.
pub struct StoragePeer {
    inner: Arc<StorageInner>,
    started: AtomicBool,
    scan_task: Mutex<Option<JoinHandle<()>>>,
}

struct StorageInner {
    ctx: PeerContext,
    root: PathBuf,
    scan_interval: Option<Duration>,
    /// Global path → last recorded mtime (ms).
    known: Mutex<BTreeMap<String, i64>>,
}

impl StoragePeer {
    /// Create a peer mirroring `root`. With a `scan_interval`, changes are
    /// picked up periodically after the initial scan.
    pub fn new(ctx: PeerContext, root: impl Into<PathBuf>, scan_interval: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(StorageInner {
                ctx,
                root: root.into(),
                scan_interval,
                known: Mutex::new(BTreeMap::new()),
            }),
            started: AtomicBool::new(false),
            scan_task: Mutex::new(None),
        }
    }

    /// Build from a descriptor: `root` (default `.`) and `scanInterval`
    /// in seconds (0 or absent disables periodic scans).
    pub fn from_config(ctx: PeerContext, conf: &PeerConfig) -> Self {
        let root = conf.option_str("root").unwrap_or(".");
        let interval = conf
            .option_u64("scanInterval")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Self::new(ctx, root, interval)
    }

    /// Filesystem root of this peer.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Scan the tree once and dispatch what changed since the last scan.
    ///
    /// Returns the number of changes dispatched.
    pub async fn scan(&self) -> Result<usize> {
        self.inner.scan().await
    }
}

impl StorageInner {
    /// Filesystem location of a global path, or `None` if it would leave `root`.
    fn fs_path(&self, global_path: &str) -> Option<PathBuf> {
        let local = self.ctx.to_local_path(global_path);
        let relative = Path::new(local.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Global path of a file found at `local` (relative to `root`). Undoes
    /// [`fs_path`](Self::fs_path): only the base directory is stripped.
    fn global_path_of(&self, local: &str) -> String {
        let base = self.ctx.translator().base_dir().trim_matches('/');
        if base.is_empty() {
            return local.to_string();
        }
        local
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(local)
            .to_string()
    }

    async fn read(&self, path: &Path) -> std::io::Result<FileData> {
        let metadata = tokio::fs::metadata(path).await?;
        let data = tokio::fs::read(path).await?;
        let mtime = metadata.modified().map(to_millis).unwrap_or(0);
        let ctime = metadata.created().map(to_millis).unwrap_or(mtime);
        Ok(FileData::new(data, ctime, mtime))
    }

    async fn write(&self, path: &Path, data: &FileData) -> std::io::Result<i64> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &data.data).await?;

        if data.mtime > 0 {
            let target = path.to_path_buf();
            let mtime = UNIX_EPOCH + Duration::from_millis(data.mtime as u64);
            tokio::task::spawn_blocking(move || {
                std::fs::OpenOptions::new()
                    .write(true)
                    .open(target)?
                    .set_modified(mtime)
            })
            .await
            .map_err(std::io::Error::other)??;
        }

        let metadata = tokio::fs::metadata(path).await?;
        Ok(metadata.modified().map(to_millis).unwrap_or(0))
    }

    fn known(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, i64>> {
        self.known.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_known(&self) {
        let loaded = match self.ctx.get_setting(KNOWN_FILES_KEY) {
            Ok(Some(text)) => serde_json::from_str(&text).unwrap_or_else(|err| {
                self.ctx.debug_log(format!("discarding unreadable file index: {}", err));
                BTreeMap::new()
            }),
            Ok(None) => BTreeMap::new(),
            Err(err) => {
                self.ctx.debug_log(format!("could not read file index: {}", err));
                BTreeMap::new()
            }
        };
        *self.known() = loaded;
    }

    fn save_known(&self) {
        let text = match serde_json::to_string(&*self.known()) {
            Ok(text) => text,
            Err(err) => {
                self.ctx.debug_log(format!("could not encode file index: {}", err));
                return;
            }
        };
        if let Err(err) = self.ctx.set_setting(KNOWN_FILES_KEY, &text) {
            tracing::warn!(peer = %self.ctx.identity().name, error = %err, "could not persist file index");
        }
    }

    /// Local paths (relative to `root`, `/`-separated) of every visible file
    /// under the peer's base directory, with their mtimes.
    async fn list_files(&self) -> std::io::Result<BTreeMap<String, i64>> {
        let base = self.ctx.translator().base_dir().trim_start_matches('/').to_string();
        let mut files = BTreeMap::new();
        let mut pending = vec![(self.root.join(&base), base.trim_end_matches('/').to_string())];

        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                let local = if prefix.is_empty() {
                    name
                } else {
                    format!("{}/{}", prefix, name)
                };
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push((entry.path(), local));
                } else if file_type.is_file() {
                    let mtime = entry.metadata().await?.modified().map(to_millis).unwrap_or(0);
                    files.insert(local, mtime);
                }
            }
        }
        Ok(files)
    }

    async fn scan(&self) -> Result<usize> {
        let on_disk = self.list_files().await?;
        let mut dispatched = 0;
        let mut changed = false;
        let mut seen = Vec::with_capacity(on_disk.len());

        for (local, mtime) in on_disk {
            let global = self.global_path_of(&local);
            seen.push(global.clone());

            let previous = self.known().get(&global).copied();
            if previous == Some(mtime) {
                continue;
            }
            changed = true;

            let data = match self.read(&self.root.join(&local)).await {
                Ok(data) => data,
                Err(err) => {
                    self.ctx.debug_log(format!("could not read {}: {}", local, err));
                    continue;
                }
            };
            self.known().insert(global.clone(), mtime);

            if self.ctx.is_repeating(&global, Some(&data)) {
                self.ctx.debug_log(format!("{} unchanged, not sending", global));
                continue;
            }
            self.ctx.send_log(&global);
            self.ctx.dispatch(&global, Some(data)).await?;
            dispatched += 1;
        }

        let vanished: Vec<String> = self
            .known()
            .keys()
            .filter(|path| !seen.contains(path))
            .cloned()
            .collect();
        for global in vanished {
            changed = true;
            self.known().remove(&global);
            if self.ctx.is_repeating(&global, None) {
                continue;
            }
            self.ctx.send_log(format!("{} (deleted)", global));
            self.ctx.dispatch(&global, None).await?;
            dispatched += 1;
        }

        if changed {
            self.save_known();
        }
        Ok(dispatched)
    }

    /// Startup work: create the root, load the index, scan once.
    async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        self.load_known();
        self.ctx.normal_log(format!("watching {}", self.root.display()));
        self.scan().await?;
        Ok(())
    }
}

#[async_trait]
impl Peer for StoragePeer {
    fn context(&self) -> &PeerContext {
        &self.inner.ctx
    }

    async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(err) = self.inner.prepare().await {
            self.started.store(false, Ordering::SeqCst);
            return Err(err);
        }

        if let Some(period) = self.inner.scan_interval {
            let inner = Arc::clone(&self.inner);
            let task = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    match inner.scan().await {
                        Ok(_) => {}
                        Err(BridgeError::HubClosed) => break,
                        Err(err) => inner.ctx.debug_log(format!("scan failed: {}", err)),
                    }
                }
            });
            *self
                .scan_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(task);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(task) = self
            .scan_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, path: &str) -> Option<FileData> {
        let ctx = &self.inner.ctx;
        let Some(fs_path) = self.inner.fs_path(path) else {
            ctx.debug_log(format!("refusing to read outside root: {}", path));
            return None;
        };
        match self.inner.read(&fs_path).await {
            Ok(data) => {
                ctx.debug_log(format!("read {}", path));
                Some(data)
            }
            Err(err) => {
                ctx.debug_log(format!("could not read {}: {}", path, err));
                None
            }
        }
    }

    async fn put(&self, path: &str, data: &FileData) -> bool {
        let ctx = &self.inner.ctx;
        if ctx.has_seen(path, Some(data)) {
            ctx.debug_log(format!("{} already up to date", path));
            return true;
        }
        let Some(fs_path) = self.inner.fs_path(path) else {
            ctx.debug_log(format!("refusing to write outside root: {}", path));
            return false;
        };
        ctx.receive_log(path);
        match self.inner.write(&fs_path, data).await {
            Ok(mtime) => {
                ctx.mark_seen(path, Some(data));
                self.inner.known().insert(path.to_string(), mtime);
                self.inner.save_known();
                true
            }
            Err(err) => {
                ctx.debug_log(format!("could not write {}: {}", path, err));
                false
            }
        }
    }

    async fn delete(&self, path: &str) -> bool {
        let ctx = &self.inner.ctx;
        if ctx.has_seen(path, None) {
            ctx.debug_log(format!("{} already deleted", path));
            return true;
        }
        let Some(fs_path) = self.inner.fs_path(path) else {
            ctx.debug_log(format!("refusing to delete outside root: {}", path));
            return false;
        };
        ctx.receive_log(format!("{} (deleted)", path));
        let removed = match tokio::fs::remove_file(&fs_path).await {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => true,
            Err(err) => {
                ctx.debug_log(format!("could not delete {}: {}", path, err));
                false
            }
        };
        if !removed {
            return false;
        }
        ctx.mark_seen(path, None);
        if self.inner.known().remove(path).is_some() {
            self.inner.save_known();
        }
        true
    }
}

impl Drop for StoragePeer {
    fn drop(&mut self) {
        if let Some(task) = self
            .scan_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

fn to_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{self, DispatchEvent, Dispatcher};
    use livesync_bridge_core::{DedupConfig, PeerIdentity};
    use livesync_bridge_store::{MemorySettingsStore, SharedStore};
    use tokio::sync::mpsc;

    fn peer_at(
        root: &Path,
        base_dir: &str,
        store: SharedStore,
    ) -> (StoragePeer, mpsc::Receiver<DispatchEvent>) {
        let (tx, rx) = dispatch::channel(64);
        let ctx = PeerContext::new(
            PeerIdentity::new("disk", STORAGE_PEER_TYPE, base_dir),
            store,
            Dispatcher::new("disk", tx),
            DedupConfig::default(),
        );
        (StoragePeer::new(ctx, root, None), rx)
    }

    fn memory() -> SharedStore {
        SharedStore::new(Arc::new(MemorySettingsStore::new()))
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let (peer, _rx) = peer_at(dir.path(), "", memory());
        let data = FileData::new(b"# hello".to_vec(), 0, 1_700_000_000_000);

        assert!(peer.put("notes/a.md", &data).await);

        let on_disk = std::fs::read(dir.path().join("notes/a.md")).unwrap();
        assert_eq!(on_disk, b"# hello");

        let read = peer.get("notes/a.md").await.unwrap();
        assert_eq!(read.data, data.data);
        assert_eq!(read.mtime / 1000, data.mtime / 1000);
    }

    #[tokio::test]
    async fn test_put_honours_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (peer, _rx) = peer_at(dir.path(), "vault/", memory());

        assert!(peer.put("a.md", &FileData::new(b"x".to_vec(), 0, 0)).await);
        assert!(dir.path().join("vault/a.md").exists());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let (peer, _rx) = peer_at(dir.path(), "", memory());
        assert!(peer.get("nope.md").await.is_none());
    }

    #[tokio::test]
    async fn test_put_refuses_escape() {
        let dir = tempfile::tempdir().unwrap();
        let (peer, _rx) = peer_at(dir.path(), "", memory());
        assert!(!peer.put("../outside.md", &FileData::new(b"x".to_vec(), 0, 0)).await);
    }

    #[tokio::test]
    async fn test_get_and_delete_refuse_escape() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(dir.path().join("outside.md"), "x").unwrap();
        let (peer, _rx) = peer_at(&root, "", memory());

        assert!(peer.get("../outside.md").await.is_none());
        assert!(!peer.delete("../outside.md").await);
        assert!(dir.path().join("outside.md").exists());
    }

    #[tokio::test]
    async fn test_scan_dispatches_new_files_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.md"), "b").unwrap();
        std::fs::write(dir.path().join(".hidden"), "h").unwrap();
        let (peer, mut rx) = peer_at(dir.path(), "", memory());

        assert_eq!(peer.scan().await.unwrap(), 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, "disk");
        assert_eq!(event.path, "sub/b.md");
        assert_eq!(event.data.unwrap().data.as_ref(), b"b");

        assert_eq!(peer.scan().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scan_reports_deletions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        let (peer, mut rx) = peer_at(dir.path(), "", memory());

        assert_eq!(peer.scan().await.unwrap(), 1);
        rx.recv().await.unwrap();

        std::fs::remove_file(dir.path().join("a.md")).unwrap();
        assert_eq!(peer.scan().await.unwrap(), 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.path, "a.md");
        assert_eq!(event.data, None);
    }

    #[tokio::test]
    async fn test_received_change_is_not_echoed() {
        let dir = tempfile::tempdir().unwrap();
        let (peer, _rx) = peer_at(dir.path(), "", memory());
        let data = FileData::new(b"from elsewhere".to_vec(), 0, 1_700_000_000_000);

        assert!(peer.put("a.md", &data).await);
        assert_eq!(peer.scan().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_repeated_put_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (peer, _rx) = peer_at(dir.path(), "", memory());
        let data = FileData::new(b"same".to_vec(), 0, 0);

        assert!(peer.put("a.md", &data).await);
        std::fs::remove_file(dir.path().join("a.md")).unwrap();

        // Same content again: reported as applied without touching disk.
        assert!(peer.put("a.md", &data).await);
        assert!(!dir.path().join("a.md").exists());
    }

    #[tokio::test]
    async fn test_failed_put_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (peer, _rx) = peer_at(dir.path(), "", memory());
        let data = FileData::new(b"retry me".to_vec(), 0, 0);

        // A directory in the way makes the write fail.
        std::fs::create_dir(dir.path().join("a.md")).unwrap();
        assert!(!peer.put("a.md", &data).await);

        std::fs::remove_dir(dir.path().join("a.md")).unwrap();
        assert!(peer.put("a.md", &data).await);
        assert_eq!(std::fs::read(dir.path().join("a.md")).unwrap(), b"retry me");
    }

    #[tokio::test]
    async fn test_failed_delete_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (peer, _rx) = peer_at(dir.path(), "", memory());
        std::fs::create_dir_all(dir.path().join("a.md/inner")).unwrap();

        // Directories are not removed by delete.
        assert!(!peer.delete("a.md").await);

        std::fs::remove_dir_all(dir.path().join("a.md")).unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        assert!(peer.delete("a.md").await);
        assert!(!dir.path().join("a.md").exists());
    }

    #[tokio::test]
    async fn test_reserved_prefix_file_is_not_echoed() {
        let dir = tempfile::tempdir().unwrap();
        let (peer, _rx) = peer_at(dir.path(), "", memory());
        let data = FileData::new(b"underscore".to_vec(), 0, 1_700_000_000_000);

        assert!(peer.put("_a.md", &data).await);
        assert!(dir.path().join("_a.md").exists());
        assert_eq!(peer.scan().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scan_keeps_reserved_prefix_under_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("vault")).unwrap();
        std::fs::write(dir.path().join("vault/_b.md"), "b").unwrap();
        let (peer, mut rx) = peer_at(dir.path(), "vault/", memory());

        assert_eq!(peer.scan().await.unwrap(), 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.path, "_b.md");
        assert_eq!(peer.get(&event.path).await.unwrap().data.as_ref(), b"b");
    }

    #[tokio::test]
    async fn test_delete_missing_file_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let (peer, _rx) = peer_at(dir.path(), "", memory());
        assert!(peer.delete("ghost.md").await);
    }

    #[tokio::test]
    async fn test_known_files_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        let store = memory();

        let (first, mut rx) = peer_at(dir.path(), "", store.clone());
        first.start().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().path, "a.md");
        first.stop().await.unwrap();

        let (second, mut rx) = peer_at(dir.path(), "", store);
        second.start().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        let (peer, mut rx) = peer_at(dir.path(), "", memory());

        peer.start().await.unwrap();
        peer.start().await.unwrap();
        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_after_failed_start() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::write(&root, "not a directory").unwrap();
        let (peer, mut rx) = peer_at(&root, "", memory());

        assert!(peer.start().await.is_err());

        std::fs::remove_file(&root).unwrap();
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a.md"), "a").unwrap();

        peer.start().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().path, "a.md");
    }

    #[test]
    fn test_from_config_options() {
        let conf: PeerConfig = serde_json::from_value(serde_json::json!({
            "name": "disk", "type": "storage", "root": "/srv/vault", "scanInterval": 0
        }))
        .unwrap();
        let (tx, _rx) = dispatch::channel(1);
        let ctx = PeerContext::new(conf.identity(), memory(), Dispatcher::new("disk", tx), DedupConfig::default());

        let peer = StoragePeer::from_config(ctx, &conf);
        assert_eq!(peer.root(), Path::new("/srv/vault"));
        assert!(peer.inner.scan_interval.is_none());
    }
}
