// Proxmox-sourced resource rows (qemu/lxc guests, node status) keyed by the
// reconnet device they were correlated to.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{Result, StoreErrorContext};

#[derive(Debug, Clone)]
pub struct ProxmoxResource {
    pub device_id: Uuid,
    pub node: String,
    pub vmid: Option<i64>,
    pub resource_type: String,
    pub status: Option<String>,
    pub cpu_percent: Option<f64>,
    pub mem_mb: Option<i64>,
    pub disk_gb: Option<i64>,
}

impl super::Store {
    pub async fn upsert_proxmox_resource(&self, res: &ProxmoxResource) -> Result<()> {
        let mut w = self.writer_guard().await;
        sqlx::query(
            r#"INSERT INTO recon_proxmox_resources (
                device_id, node, vmid, resource_type, status, cpu_percent, mem_mb, disk_gb, updated_at
            ) VALUES (?,?,?,?,?,?,?,?,?)"#,
        )
        .bind(res.device_id.to_string())
        .bind(&res.node)
        .bind(res.vmid)
        .bind(&res.resource_type)
        .bind(&res.status)
        .bind(res.cpu_percent)
        .bind(res.mem_mb)
        .bind(res.disk_gb)
        .bind(Utc::now())
        .execute(&mut *w)
        .await
        .write_context("upsert_proxmox_resource")?;
        Ok(())
    }

    pub async fn list_proxmox_resources(&self, device_id: Uuid) -> Result<Vec<ProxmoxResource>> {
        let rows = sqlx::query("SELECT * FROM recon_proxmox_resources WHERE device_id = ?")
            .bind(device_id.to_string())
            .fetch_all(&self.pool)
            .await
            .query_context("list_proxmox_resources")?;
        rows.iter()
            .map(|row| {
                Ok(ProxmoxResource {
                    device_id,
                    node: row.try_get("node")?,
                    vmid: row.try_get("vmid")?,
                    resource_type: row.try_get("resource_type")?,
                    status: row.try_get("status")?,
                    cpu_percent: row.try_get("cpu_percent")?,
                    mem_mb: row.try_get("mem_mb")?,
                    disk_gb: row.try_get("disk_gb")?,
                })
            })
            .collect()
    }
}
