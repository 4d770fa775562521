//! Schema migrations for the settings database.
//!
//! Each entry in [`MIGRATIONS`] moves the table layout from the previous
//! version to its own. Applied versions are recorded in `schema_migrations`.
//! Setting keys themselves are unversioned.

use rusqlite::{params, Connection};

use crate::error::{Result, StoreError};

/// Ordered `(version, sql)` steps.
const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    // One row per namespaced key: "{name}-{type}-{baseDir}-{key}"
    "CREATE TABLE settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );",
)];

/// Schema version after all migrations ran.
pub fn current_version() -> u32 {
    MIGRATIONS.last().map_or(0, |(version, _)| *version)
}

/// Bring the schema up to [`current_version`]. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    if applied > current_version() {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            applied,
            current_version()
        )));
    }

    let pending: Vec<_> = MIGRATIONS.iter().filter(|(v, _)| *v > applied).collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, sql) in pending {
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, now_millis()],
        )?;
        tracing::debug!(version, "applied settings schema migration");
    }
    tx.commit()?;
    Ok(())
}

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
