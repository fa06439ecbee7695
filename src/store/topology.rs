// Topology link CRUD: ARP/FDB/LLDP/WiFi directed edges between devices.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{ReconError, Result, StoreErrorContext};
use crate::types::{LinkType, TopologyLink};

use super::Store;

impl Store {
    /// Inserts a link, or touches `last_confirmed` if the (source, target,
    /// link_type) triple already exists.
    pub async fn upsert_topology_link(
        &self,
        source_device_id: Uuid,
        target_device_id: Uuid,
        link_type: LinkType,
    ) -> Result<()> {
        let mut w = self.writer_guard().await;
        sqlx::query(
            r#"INSERT INTO recon_topology_links (source_device_id, target_device_id, link_type, last_confirmed)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(source_device_id, target_device_id, link_type)
               DO UPDATE SET last_confirmed = excluded.last_confirmed"#,
        )
        .bind(source_device_id.to_string())
        .bind(target_device_id.to_string())
        .bind(link_type.to_string())
        .bind(Utc::now())
        .execute(&mut *w)
        .await
        .write_context("upsert_topology_link")?;
        Ok(())
    }

    pub async fn delete_links_for_device_of_type(&self, device_id: Uuid, link_type: LinkType) -> Result<()> {
        let mut w = self.writer_guard().await;
        sqlx::query(
            "DELETE FROM recon_topology_links WHERE (source_device_id = ? OR target_device_id = ?) AND link_type = ?",
        )
        .bind(device_id.to_string())
        .bind(device_id.to_string())
        .bind(link_type.to_string())
        .execute(&mut *w)
        .await
        .write_context("delete_links_for_device_of_type")?;
        Ok(())
    }

    pub async fn list_links_for_device(&self, device_id: Uuid) -> Result<Vec<TopologyLink>> {
        let rows = sqlx::query(
            "SELECT * FROM recon_topology_links WHERE source_device_id = ? OR target_device_id = ?",
        )
        .bind(device_id.to_string())
        .bind(device_id.to_string())
        .fetch_all(&self.pool)
        .await
        .query_context("list_links_for_device")?;
        rows.iter().map(link_from_row).collect()
    }
}

fn link_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<TopologyLink> {
    Ok(TopologyLink {
        id: row.try_get("id")?,
        source_device_id: Uuid::parse_str(&row.try_get::<String, _>("source_device_id")?)
            .map_err(|e| ReconError::StoreQuery(e.to_string()))?,
        target_device_id: Uuid::parse_str(&row.try_get::<String, _>("target_device_id")?)
            .map_err(|e| ReconError::StoreQuery(e.to_string()))?,
        link_type: row.try_get::<String, _>("link_type")?.parse().unwrap_or(LinkType::Arp),
        last_confirmed: row.try_get("last_confirmed")?,
    })
}
