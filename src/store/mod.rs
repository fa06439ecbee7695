// Typed persistence façade over a single SQLite file.
//
// Reads go through the pool (`self.pool`) and may run concurrently. Writes
// funnel through a single dedicated connection guarded by `self.writer`, the
// single-writer discipline the store is required to uphold; SQLite would
// otherwise retry lock contention itself, but routing every mutation through
// one handle keeps write latency predictable and matches the store's own
// migration-latch serialization.

pub mod devices;
pub mod hardware;
pub mod history;
pub mod migrations;
pub mod proxmox;
pub mod scans;
pub mod topology;
pub mod wifi;

use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{ReconError, Result};
use migrations::Migration;

pub struct Store {
    pool: SqlitePool,
    writer: Mutex<SqliteConnection>,
}

impl Store {
    pub async fn connect(database_path: &str) -> Result<Store> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{database_path}"))
            .map_err(|e| ReconError::StoreQuery(format!("invalid database path: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(opts.clone())
            .await
            .map_err(|e| ReconError::StoreQuery(format!("opening pool: {e}")))?;
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(|e| ReconError::StoreQuery(format!("setting WAL mode: {e}")))?;

        let mut writer = SqliteConnection::connect_with(&opts)
            .await
            .map_err(|e| ReconError::StoreQuery(format!("opening writer connection: {e}")))?;
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&mut writer)
            .await
            .map_err(|e| ReconError::StoreQuery(format!("setting WAL mode: {e}")))?;
        sqlx::query("PRAGMA foreign_keys=ON")
            .execute(&mut writer)
            .await
            .map_err(|e| ReconError::StoreQuery(format!("enabling foreign keys: {e}")))?;

        let store = Store {
            pool,
            writer: Mutex::new(writer),
        };
        store.ensure_bootstrap_tables().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_bootstrap_tables(&self) -> Result<()> {
        let mut w = self.writer.lock().await;
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS _migrations (
                namespace TEXT NOT NULL,
                version INTEGER NOT NULL,
                applied_at TEXT NOT NULL,
                PRIMARY KEY (namespace, version)
            )"#,
        )
        .execute(&mut *w)
        .await
        .map_err(|e| ReconError::StoreWrite(format!("creating _migrations: {e}")))?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS _schema_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version TEXT NOT NULL
            )"#,
        )
        .execute(&mut *w)
        .await
        .map_err(|e| ReconError::StoreWrite(format!("creating _schema_meta: {e}")))?;
        Ok(())
    }

    /// Applies every migration in `migrations` whose version has not yet been
    /// recorded for `namespace`, each inside its own transaction. Idempotent:
    /// running twice with the same set is a no-op the second time.
    pub async fn migrate(&self, namespace: &str, migrations: &[Migration]) -> Result<()> {
        let mut w = self.writer.lock().await;
        for m in migrations {
            let applied: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM _migrations WHERE namespace = ? AND version = ?")
                    .bind(namespace)
                    .bind(m.version)
                    .fetch_optional(&mut *w)
                    .await
                    .map_err(|e| ReconError::StoreQuery(format!("checking migration state: {e}")))?;
            if applied.is_some() {
                continue;
            }

            let mut tx = w.begin().await.map_err(|e| ReconError::MigrationFailed {
                namespace: namespace.to_string(),
                version: m.version,
                detail: e.to_string(),
            })?;

            for statement in m.sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| ReconError::MigrationFailed {
                        namespace: namespace.to_string(),
                        version: m.version,
                        detail: e.to_string(),
                    })?;
            }

            sqlx::query("INSERT INTO _migrations (namespace, version, applied_at) VALUES (?, ?, ?)")
                .bind(namespace)
                .bind(m.version)
                .bind(Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await
                .map_err(|e| ReconError::MigrationFailed {
                    namespace: namespace.to_string(),
                    version: m.version,
                    detail: e.to_string(),
                })?;

            tx.commit().await.map_err(|e| ReconError::MigrationFailed {
                namespace: namespace.to_string(),
                version: m.version,
                detail: e.to_string(),
            })?;

            info!(namespace, version = m.version, "applied migration");
        }
        Ok(())
    }

    /// Runs the bundled `recon` namespace migrations.
    pub async fn migrate_recon(&self) -> Result<()> {
        self.migrate(migrations::NAMESPACE, migrations::MIGRATIONS).await
    }

    /// Checks the running process version against the stored schema
    /// version. First call records `running_version`. The literal `"dev"`
    /// on either side always passes.
    pub async fn check_version(&self, running_version: &str) -> Result<()> {
        let mut w = self.writer.lock().await;
        let row: Option<(String,)> = sqlx::query_as("SELECT version FROM _schema_meta WHERE id = 1")
            .fetch_optional(&mut *w)
            .await
            .map_err(|e| ReconError::StoreQuery(format!("reading schema_meta: {e}")))?;

        match row {
            None => {
                sqlx::query("INSERT INTO _schema_meta (id, version) VALUES (1, ?)")
                    .bind(running_version)
                    .execute(&mut *w)
                    .await
                    .map_err(|e| ReconError::StoreWrite(format!("inserting schema_meta: {e}")))?;
                Ok(())
            }
            Some((stored,)) => {
                if stored == "dev" || running_version == "dev" {
                    return Ok(());
                }
                match version_cmp(&stored, running_version) {
                    std::cmp::Ordering::Equal => Ok(()),
                    std::cmp::Ordering::Greater => Err(ReconError::NewerSchema {
                        stored,
                        running: running_version.to_string(),
                    }),
                    std::cmp::Ordering::Less => {
                        sqlx::query("UPDATE _schema_meta SET version = ? WHERE id = 1")
                            .bind(running_version)
                            .execute(&mut *w)
                            .await
                            .map_err(|e| ReconError::StoreWrite(format!("updating schema_meta: {e}")))?;
                        warn!(from = %stored, to = running_version, "schema version advanced");
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Compares two `MAJOR.MINOR.PATCH`-shaped version strings numerically,
/// falling back to lexicographic comparison for anything that doesn't parse.
fn version_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |s: &str| -> Option<(u64, u64, u64)> {
        let mut parts = s.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().unwrap_or("0").parse().ok()?;
        let patch = parts.next().unwrap_or("0").parse().ok()?;
        Some((major, minor, patch))
    };
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = Store::connect(path.to_str().unwrap()).await.unwrap();
        store.migrate_recon().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let (_dir, store) = temp_store().await;
        store.migrate_recon().await.unwrap();
        let applied: Vec<(i64,)> = sqlx::query_as("SELECT version FROM _migrations WHERE namespace = 'recon'")
            .fetch_all(store.pool())
            .await
            .unwrap();
        assert_eq!(applied.len(), migrations::MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_version_gate() {
        let (_dir, store) = temp_store().await;
        store.check_version("0.4.0").await.unwrap();
        store.check_version("0.4.0").await.unwrap();
        store.check_version("0.5.0").await.unwrap();
        let err = store.check_version("0.4.0").await.unwrap_err();
        assert!(matches!(err, ReconError::NewerSchema { .. }));
    }

    #[tokio::test]
    async fn test_version_gate_dev_bypass() {
        let (_dir, store) = temp_store().await;
        store.check_version("0.4.0").await.unwrap();
        store.check_version("dev").await.unwrap();
        store.check_version("9.9.9").await.unwrap();
    }
}
