//! Startup health check for the shared settings store.
//!
//! Runs once, before any peer is constructed. The store is probed by
//! writing and removing [`HEALTH_CHECK_KEY`](crate::HEALTH_CHECK_KEY). If the
//! probe reports corruption, the guard:
//!
//! 1. recursively deletes the known corrupt artifacts (the database file and
//!    its `-wal`/`-shm` sidecars) under the data directory,
//! 2. reopens and clears the store,
//! 3. probes again.
//!
//! If the store is still unhealthy the original error is returned and the
//! process must not continue.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{Result, StoreError};
use crate::sqlite::SETTINGS_DB_FILE;
use crate::traits::{SettingsStore, StoreExt};

/// Outcome of a successful health check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Whether a corruption recovery was needed.
    pub recovered: bool,
    /// Number of corrupt artifact files deleted.
    pub removed_files: usize,
}

/// Detects and recovers a corrupted settings store at startup.
#[derive(Debug, Clone)]
pub struct StorageHealthGuard {
    data_dir: PathBuf,
    artifacts: BTreeSet<String>,
}

impl StorageHealthGuard {
    /// Guard for a store whose database file is [`SETTINGS_DB_FILE`] under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::for_database(data_dir, SETTINGS_DB_FILE)
    }

    /// Guard for a store whose database file is named `db_file`.
    pub fn for_database(data_dir: impl Into<PathBuf>, db_file: &str) -> Self {
        let artifacts = [
            db_file.to_string(),
            format!("{}-wal", db_file),
            format!("{}-shm", db_file),
        ]
        .into_iter()
        .collect();
        Self {
            data_dir: data_dir.into(),
            artifacts,
        }
    }

    /// The directory searched for corrupt artifacts.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Probe the store, recovering once from corruption.
    pub fn ensure_healthy(&self, store: &dyn SettingsStore) -> Result<HealthReport> {
        match store.probe() {
            Ok(()) => Ok(HealthReport::default()),
            Err(err) => {
                let removed_files = self.recover("startup probe", store, err)?;
                Ok(HealthReport {
                    recovered: true,
                    removed_files,
                })
            }
        }
    }

    /// Wipe the store unconditionally, then run the health check.
    ///
    /// A clear that fails with corruption goes through the same recovery.
    pub fn reset(&self, store: &dyn SettingsStore) -> Result<HealthReport> {
        let mut report = HealthReport::default();
        if let Err(err) = store.clear() {
            report.removed_files = self.recover("reset", store, err)?;
            report.recovered = true;
            store.clear()?;
        }
        info!("settings store reset");

        let probe = self.ensure_healthy(store)?;
        Ok(HealthReport {
            recovered: report.recovered || probe.recovered,
            removed_files: report.removed_files + probe.removed_files,
        })
    }

    /// Recover from `err` if it is corruption; returns the number of files removed.
    ///
    /// Any failure hands back the original error.
    fn recover(&self, stage: &str, store: &dyn SettingsStore, err: StoreError) -> Result<usize> {
        if !err.is_corruption() {
            return Err(err);
        }
        error!(stage, error = %err, "malformed settings store detected");

        let removed = self.remove_corrupt_files()?;
        error!(
            removed,
            dir = %self.data_dir.display(),
            "removed corrupted settings store files"
        );

        if let Err(reopen_err) = store.reopen() {
            warn!(error = %reopen_err, "failed to reopen settings store");
        }
        // The file removal is the real recovery step; the probe decides.
        if let Err(clear_err) = store.clear() {
            debug!(error = %clear_err, "clearing settings store after purge failed");
        }

        match store.probe() {
            Ok(()) => {
                info!("settings store recovery succeeded");
                Ok(removed)
            }
            Err(probe_err) => {
                error!(error = %probe_err, "settings store recovery probe failed");
                Err(err)
            }
        }
    }

    /// Recursively delete corrupt artifacts under the data directory.
    ///
    /// A missing data directory counts as nothing removed.
    pub fn remove_corrupt_files(&self) -> Result<usize> {
        match remove_matching(&self.data_dir, &self.artifacts) {
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            other => other,
        }
    }
}

fn remove_matching(dir: &Path, names: &BTreeSet<String>) -> Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            removed += remove_matching(&path, names)?;
            continue;
        }

        let matches = entry
            .file_name()
            .to_str()
            .map_or(false, |name| names.contains(name));
        if file_type.is_file() && matches {
            std::fs::remove_file(&path)?;
            debug!(path = %path.display(), "removed corrupt settings artifact");
            removed += 1;
        }
    }
    Ok(removed)
}
