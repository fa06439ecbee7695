// Child profile CRUD (hardware/storage/GPU/services) implementing the
// manual-vs-auto override precedence from the identity engine's contract:
// an auto-collected write never clobbers a non-empty manual field, and an
// auto-collected list never displaces a manual row.

use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::{Result, StoreErrorContext};

pub const MANUAL: &str = "manual";

#[derive(Debug, Clone, Default)]
pub struct HardwareProfile {
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub kernel: Option<String>,
    pub cpu_model: Option<String>,
    pub cpu_cores: Option<i64>,
    pub total_memory_mb: Option<i64>,
    pub collection_source: String,
}

#[derive(Debug, Clone)]
pub struct StorageDevice {
    pub name: String,
    pub storage_type: String,
    pub capacity_gb: Option<i64>,
    pub collection_source: String,
}

#[derive(Debug, Clone)]
pub struct GpuDevice {
    pub model: String,
    pub memory_mb: Option<i64>,
    pub collection_source: String,
}

#[derive(Debug, Clone)]
pub struct ServiceRecord {
    pub port: i32,
    pub protocol: String,
    pub service_name: Option<String>,
    pub collection_source: String,
}

fn merge_str(existing: Option<&str>, incoming: Option<&str>) -> Option<String> {
    match incoming {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => existing.map(|s| s.to_string()),
    }
}

impl super::Store {
    /// Upserts the single-row hardware profile for `device_id` per the
    /// manual-override precedence: manual-over-manual fully replaces;
    /// auto-over-manual only fills fields the manual record left empty;
    /// auto-over-auto and first-write-of-any-kind fully replace.
    pub async fn upsert_hardware(
        &self,
        conn: &mut SqliteConnection,
        device_id: Uuid,
        incoming: &HardwareProfile,
    ) -> Result<()> {
        let existing = self.get_hardware_conn(conn, device_id).await?;

        let merged = match existing {
            Some(existing) if existing.collection_source == MANUAL && incoming.collection_source != MANUAL => {
                HardwareProfile {
                    hostname: merge_str(existing.hostname.as_deref(), incoming.hostname.as_deref()),
                    os: merge_str(existing.os.as_deref(), incoming.os.as_deref()),
                    kernel: merge_str(existing.kernel.as_deref(), incoming.kernel.as_deref()),
                    cpu_model: merge_str(existing.cpu_model.as_deref(), incoming.cpu_model.as_deref()),
                    cpu_cores: existing.cpu_cores.or(incoming.cpu_cores),
                    total_memory_mb: existing.total_memory_mb.or(incoming.total_memory_mb),
                    collection_source: MANUAL.to_string(),
                }
            }
            _ => incoming.clone(),
        };

        sqlx::query(
            r#"INSERT INTO recon_device_hardware (
                device_id, hostname, os, kernel, cpu_model, cpu_cores, total_memory_mb, collection_source, updated_at
            ) VALUES (?,?,?,?,?,?,?,?,?)
            ON CONFLICT(device_id) DO UPDATE SET
                hostname = excluded.hostname, os = excluded.os, kernel = excluded.kernel,
                cpu_model = excluded.cpu_model, cpu_cores = excluded.cpu_cores,
                total_memory_mb = excluded.total_memory_mb, collection_source = excluded.collection_source,
                updated_at = excluded.updated_at"#,
        )
        .bind(device_id.to_string())
        .bind(&merged.hostname)
        .bind(&merged.os)
        .bind(&merged.kernel)
        .bind(&merged.cpu_model)
        .bind(merged.cpu_cores)
        .bind(merged.total_memory_mb)
        .bind(&merged.collection_source)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .write_context("upsert_hardware")?;
        Ok(())
    }

    pub async fn get_hardware(&self, device_id: Uuid) -> Result<Option<HardwareProfile>> {
        let row = sqlx::query("SELECT * FROM recon_device_hardware WHERE device_id = ?")
            .bind(device_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .query_context("get_hardware")?;
        row.as_ref().map(hardware_from_row).transpose()
    }

    async fn get_hardware_conn(
        &self,
        conn: &mut SqliteConnection,
        device_id: Uuid,
    ) -> Result<Option<HardwareProfile>> {
        let row = sqlx::query("SELECT * FROM recon_device_hardware WHERE device_id = ?")
            .bind(device_id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .query_context("get_hardware_conn")?;
        row.as_ref().map(hardware_from_row).transpose()
    }

    /// Replaces non-manual storage rows for `device_id` with `incoming`;
    /// rows whose `collection_source = manual` are left untouched.
    pub async fn replace_storage(
        &self,
        conn: &mut SqliteConnection,
        device_id: Uuid,
        incoming: &[StorageDevice],
    ) -> Result<()> {
        sqlx::query("DELETE FROM recon_device_storage WHERE device_id = ? AND collection_source != ?")
            .bind(device_id.to_string())
            .bind(MANUAL)
            .execute(&mut *conn)
            .await
            .write_context("replace_storage:delete")?;
        for item in incoming {
            if item.collection_source == MANUAL {
                continue;
            }
            sqlx::query(
                "INSERT INTO recon_device_storage (device_id, name, storage_type, capacity_gb, collection_source, updated_at) VALUES (?,?,?,?,?,?)",
            )
            .bind(device_id.to_string())
            .bind(&item.name)
            .bind(&item.storage_type)
            .bind(item.capacity_gb)
            .bind(&item.collection_source)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await
            .write_context("replace_storage:insert")?;
        }
        Ok(())
    }

    pub async fn replace_gpu(
        &self,
        conn: &mut SqliteConnection,
        device_id: Uuid,
        incoming: &[GpuDevice],
    ) -> Result<()> {
        sqlx::query("DELETE FROM recon_device_gpu WHERE device_id = ? AND collection_source != ?")
            .bind(device_id.to_string())
            .bind(MANUAL)
            .execute(&mut *conn)
            .await
            .write_context("replace_gpu:delete")?;
        for item in incoming {
            if item.collection_source == MANUAL {
                continue;
            }
            sqlx::query(
                "INSERT INTO recon_device_gpu (device_id, model, memory_mb, collection_source, updated_at) VALUES (?,?,?,?,?)",
            )
            .bind(device_id.to_string())
            .bind(&item.model)
            .bind(item.memory_mb)
            .bind(&item.collection_source)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await
            .write_context("replace_gpu:insert")?;
        }
        Ok(())
    }

    pub async fn replace_services(
        &self,
        conn: &mut SqliteConnection,
        device_id: Uuid,
        incoming: &[ServiceRecord],
    ) -> Result<()> {
        sqlx::query("DELETE FROM recon_device_services WHERE device_id = ? AND collection_source != ?")
            .bind(device_id.to_string())
            .bind(MANUAL)
            .execute(&mut *conn)
            .await
            .write_context("replace_services:delete")?;
        for item in incoming {
            if item.collection_source == MANUAL {
                continue;
            }
            sqlx::query(
                "INSERT INTO recon_device_services (device_id, port, protocol, service_name, collection_source, updated_at) VALUES (?,?,?,?,?,?)",
            )
            .bind(device_id.to_string())
            .bind(item.port)
            .bind(&item.protocol)
            .bind(&item.service_name)
            .bind(&item.collection_source)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await
            .write_context("replace_services:insert")?;
        }
        Ok(())
    }

    pub async fn list_services(&self, device_id: Uuid) -> Result<Vec<ServiceRecord>> {
        let rows = sqlx::query("SELECT * FROM recon_device_services WHERE device_id = ?")
            .bind(device_id.to_string())
            .fetch_all(&self.pool)
            .await
            .query_context("list_services")?;
        rows.iter()
            .map(|row| {
                Ok(ServiceRecord {
                    port: row.try_get("port")?,
                    protocol: row.try_get("protocol")?,
                    service_name: row.try_get("service_name")?,
                    collection_source: row.try_get("collection_source")?,
                })
            })
            .collect()
    }
}

fn hardware_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<HardwareProfile> {
    Ok(HardwareProfile {
        hostname: row.try_get("hostname")?,
        os: row.try_get("os")?,
        kernel: row.try_get("kernel")?,
        cpu_model: row.try_get("cpu_model")?,
        cpu_cores: row.try_get("cpu_cores")?,
        total_memory_mb: row.try_get("total_memory_mb")?,
        collection_source: row.try_get("collection_source")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::identity::upsert_device;
    use crate::types::DeviceBuilder;

    async fn temp_store() -> (tempfile::TempDir, super::super::Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = super::super::Store::connect(path.to_str().unwrap()).await.unwrap();
        store.migrate_recon().await.unwrap();
        (dir, store)
    }

    /// A manual record (hostname=manual-host, os=FreeBSD 14, kernel empty)
    /// survives a subsequent auto-collected write (hostname=auto-host,
    /// os=Linux 6.5, kernel=6.5.0-44-generic): the manual hostname and OS
    /// are kept, but the manual record's empty kernel field is filled in
    /// from the auto write.
    #[tokio::test]
    async fn test_auto_write_fills_gaps_but_not_manual_fields() {
        let (_dir, store) = temp_store().await;
        let events = EventBus::new();
        let candidate = DeviceBuilder::default().ip("10.0.0.9");
        let outcome = upsert_device(&store, &events, candidate).await.unwrap();
        let device_id = outcome.device_id;
        let mut conn = store.writer_guard().await;

        let manual = HardwareProfile {
            hostname: Some("manual-host".to_string()),
            os: Some("FreeBSD 14".to_string()),
            kernel: None,
            cpu_model: None,
            cpu_cores: None,
            total_memory_mb: None,
            collection_source: MANUAL.to_string(),
        };
        store.upsert_hardware(&mut conn, device_id, &manual).await.unwrap();

        let auto = HardwareProfile {
            hostname: Some("auto-host".to_string()),
            os: Some("Linux 6.5".to_string()),
            kernel: Some("6.5.0-44-generic".to_string()),
            cpu_model: None,
            cpu_cores: None,
            total_memory_mb: None,
            collection_source: "scout-linux".to_string(),
        };
        store.upsert_hardware(&mut conn, device_id, &auto).await.unwrap();
        drop(conn);

        let merged = store.get_hardware(device_id).await.unwrap().unwrap();
        assert_eq!(merged.hostname.as_deref(), Some("manual-host"));
        assert_eq!(merged.os.as_deref(), Some("FreeBSD 14"));
        assert_eq!(merged.kernel.as_deref(), Some("6.5.0-44-generic"));
        assert_eq!(merged.collection_source, MANUAL);
    }

    #[tokio::test]
    async fn test_auto_write_replaces_prior_auto_write() {
        let (_dir, store) = temp_store().await;
        let events = EventBus::new();
        let candidate = DeviceBuilder::default().ip("10.0.0.10");
        let outcome = upsert_device(&store, &events, candidate).await.unwrap();
        let device_id = outcome.device_id;
        let mut conn = store.writer_guard().await;

        let first_auto = HardwareProfile {
            hostname: Some("auto-host".to_string()),
            os: Some("Linux 6.1".to_string()),
            collection_source: "scout-linux".to_string(),
            ..Default::default()
        };
        store.upsert_hardware(&mut conn, device_id, &first_auto).await.unwrap();

        let second_auto = HardwareProfile {
            hostname: Some("auto-host-2".to_string()),
            os: Some("Linux 6.5".to_string()),
            collection_source: "scout-linux".to_string(),
            ..Default::default()
        };
        store.upsert_hardware(&mut conn, device_id, &second_auto).await.unwrap();
        drop(conn);

        let merged = store.get_hardware(device_id).await.unwrap().unwrap();
        assert_eq!(merged.hostname.as_deref(), Some("auto-host-2"));
        assert_eq!(merged.os.as_deref(), Some("Linux 6.5"));
    }
}
