// Low-level CRUD against `recon_devices`. Field-merge semantics live in
// `crate::identity`; this module only knows how to read and write rows.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::{ReconError, Result, StoreErrorContext};
use crate::types::{
    ClassificationSignal, ClassificationSource, ConnectionType, Device, DeviceStatus,
    DeviceType, DiscoveryMethod,
};

use super::Store;

fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> Result<Device> {
    let ip_addresses: Vec<String> =
        serde_json::from_str(row.try_get::<String, _>("ip_addresses")?.as_str())
            .unwrap_or_default();
    let tags: HashSet<String> =
        serde_json::from_str(row.try_get::<String, _>("tags")?.as_str()).unwrap_or_default();
    let custom_fields: BTreeMap<String, String> =
        serde_json::from_str(row.try_get::<String, _>("custom_fields")?.as_str())
            .unwrap_or_default();
    let classification_signals: Vec<ClassificationSignal> =
        serde_json::from_str(row.try_get::<String, _>("classification_signals")?.as_str())
            .unwrap_or_default();

    let id: String = row.try_get("id")?;
    let parent_device_id: Option<String> = row.try_get("parent_device_id")?;

    Ok(Device {
        id: Uuid::parse_str(&id).map_err(|e| ReconError::StoreQuery(e.to_string()))?,
        mac_address: row.try_get("mac_address")?,
        ip_addresses,
        hostname: row.try_get("hostname")?,
        device_type: row
            .try_get::<String, _>("device_type")?
            .parse()
            .unwrap_or(DeviceType::Unknown),
        classification_confidence: row.try_get::<i64, _>("classification_confidence")? as u8,
        classification_source: row
            .try_get::<String, _>("classification_source")?
            .parse()
            .unwrap_or(ClassificationSource::None),
        classification_signals,
        status: row
            .try_get::<String, _>("status")?
            .parse()
            .unwrap_or(DeviceStatus::Unknown),
        first_seen: row.try_get::<DateTime<Utc>, _>("first_seen")?,
        last_seen: row.try_get::<DateTime<Utc>, _>("last_seen")?,
        discovery_method: row
            .try_get::<String, _>("discovery_method")?
            .parse()
            .unwrap_or(DiscoveryMethod::Manual),
        agent_id: row.try_get("agent_id")?,
        manufacturer: row.try_get("manufacturer")?,
        os: row.try_get("os")?,
        location: row.try_get("location")?,
        category: row.try_get("category")?,
        primary_role: row.try_get("primary_role")?,
        owner: row.try_get("owner")?,
        notes: row.try_get("notes")?,
        tags,
        custom_fields,
        parent_device_id: parent_device_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| ReconError::StoreQuery(e.to_string()))?,
        network_layer: row.try_get::<i64, _>("network_layer")? as i32,
        connection_type: row
            .try_get::<String, _>("connection_type")?
            .parse()
            .unwrap_or(ConnectionType::Unknown),
    })
}

const SELECT_DEVICE: &str = "SELECT * FROM recon_devices";

impl Store {
    pub async fn get_device(&self, id: Uuid) -> Result<Option<Device>> {
        let row = sqlx::query(&format!("{SELECT_DEVICE} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .query_context("get_device")?;
        row.as_ref().map(row_to_device).transpose()
    }

    pub async fn get_device_by_mac(&self, mac: &str) -> Result<Option<Device>> {
        let row = sqlx::query(&format!("{SELECT_DEVICE} WHERE mac_address = ?"))
            .bind(mac)
            .fetch_optional(&self.pool)
            .await
            .query_context("get_device_by_mac")?;
        row.as_ref().map(row_to_device).transpose()
    }

    /// Substring match against the JSON-encoded IP list, mirroring the
    /// store's documented `LIKE '%"<ip>"%'` lookup.
    pub async fn get_device_by_ip(&self, ip: &str) -> Result<Option<Device>> {
        let pattern = format!("%\"{ip}\"%");
        let row = sqlx::query(&format!("{SELECT_DEVICE} WHERE ip_addresses LIKE ? LIMIT 1"))
            .bind(pattern)
            .fetch_optional(&self.pool)
            .await
            .query_context("get_device_by_ip")?;
        row.as_ref().map(row_to_device).transpose()
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let rows = sqlx::query(SELECT_DEVICE)
            .fetch_all(&self.pool)
            .await
            .query_context("list_devices")?;
        rows.iter().map(row_to_device).collect()
    }

    pub async fn list_devices_by_status(&self, status: DeviceStatus) -> Result<Vec<Device>> {
        let rows = sqlx::query(&format!("{SELECT_DEVICE} WHERE status = ?"))
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await
            .query_context("list_devices_by_status")?;
        rows.iter().map(row_to_device).collect()
    }

    pub async fn insert_device(&self, conn: &mut SqliteConnection, device: &Device) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO recon_devices (
                id, mac_address, ip_addresses, hostname, device_type,
                classification_confidence, classification_source, classification_signals,
                status, first_seen, last_seen, discovery_method, agent_id,
                manufacturer, os, location, category, primary_role, owner, notes,
                tags, custom_fields, parent_device_id, network_layer, connection_type,
                created_at, updated_at
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)"#,
        )
        .bind(device.id.to_string())
        .bind(&device.mac_address)
        .bind(serde_json::to_string(&device.ip_addresses).unwrap())
        .bind(&device.hostname)
        .bind(device.device_type.to_string())
        .bind(device.classification_confidence as i64)
        .bind(device.classification_source.to_string())
        .bind(serde_json::to_string(&device.classification_signals).unwrap())
        .bind(device.status.to_string())
        .bind(device.first_seen)
        .bind(device.last_seen)
        .bind(device.discovery_method.to_string())
        .bind(&device.agent_id)
        .bind(&device.manufacturer)
        .bind(&device.os)
        .bind(&device.location)
        .bind(&device.category)
        .bind(&device.primary_role)
        .bind(&device.owner)
        .bind(&device.notes)
        .bind(serde_json::to_string(&device.tags).unwrap())
        .bind(serde_json::to_string(&device.custom_fields).unwrap())
        .bind(device.parent_device_id.map(|i| i.to_string()))
        .bind(device.network_layer as i64)
        .bind(device.connection_type.to_string())
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .write_context("insert_device")?;
        Ok(())
    }

    pub async fn update_device(&self, conn: &mut SqliteConnection, device: &Device) -> Result<()> {
        sqlx::query(
            r#"UPDATE recon_devices SET
                mac_address = ?, ip_addresses = ?, hostname = ?, device_type = ?,
                classification_confidence = ?, classification_source = ?, classification_signals = ?,
                status = ?, last_seen = ?, discovery_method = ?, agent_id = ?,
                manufacturer = ?, os = ?, location = ?, category = ?, primary_role = ?,
                owner = ?, notes = ?, tags = ?, custom_fields = ?, parent_device_id = ?,
                network_layer = ?, connection_type = ?, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(&device.mac_address)
        .bind(serde_json::to_string(&device.ip_addresses).unwrap())
        .bind(&device.hostname)
        .bind(device.device_type.to_string())
        .bind(device.classification_confidence as i64)
        .bind(device.classification_source.to_string())
        .bind(serde_json::to_string(&device.classification_signals).unwrap())
        .bind(device.status.to_string())
        .bind(device.last_seen)
        .bind(device.discovery_method.to_string())
        .bind(&device.agent_id)
        .bind(&device.manufacturer)
        .bind(&device.os)
        .bind(&device.location)
        .bind(&device.category)
        .bind(&device.primary_role)
        .bind(&device.owner)
        .bind(&device.notes)
        .bind(serde_json::to_string(&device.tags).unwrap())
        .bind(serde_json::to_string(&device.custom_fields).unwrap())
        .bind(device.parent_device_id.map(|i| i.to_string()))
        .bind(device.network_layer as i64)
        .bind(device.connection_type.to_string())
        .bind(Utc::now())
        .bind(device.id.to_string())
        .execute(&mut *conn)
        .await
        .write_context("update_device")?;
        Ok(())
    }

    pub async fn delete_device(&self, id: Uuid) -> Result<()> {
        let mut w = self.writer.lock().await;
        sqlx::query("DELETE FROM recon_devices WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *w)
            .await
            .write_context("delete_device")?;
        Ok(())
    }

    pub async fn update_hierarchy(
        &self,
        conn: &mut SqliteConnection,
        device_id: Uuid,
        parent_device_id: Option<Uuid>,
        network_layer: i32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE recon_devices SET parent_device_id = ?, network_layer = ?, updated_at = ? WHERE id = ?",
        )
        .bind(parent_device_id.map(|i| i.to_string()))
        .bind(network_layer as i64)
        .bind(Utc::now())
        .bind(device_id.to_string())
        .execute(&mut *conn)
        .await
        .write_context("update_hierarchy")?;
        Ok(())
    }

    /// Resets every device's inferred hierarchy fields. Mirrors the store's
    /// documented SQL-level behavior exactly: this wipes manually-set
    /// parents too, despite that not being the intent of the operation's
    /// name.
    pub async fn clear_hierarchy(&self) -> Result<()> {
        let mut w = self.writer.lock().await;
        sqlx::query("UPDATE recon_devices SET parent_device_id = NULL, network_layer = 0, updated_at = ?")
            .bind(Utc::now())
            .execute(&mut *w)
            .await
            .write_context("clear_hierarchy")?;
        Ok(())
    }
}

impl Store {
    /// Exposes the single writer handle for callers (the identity engine)
    /// that need to run several statements as one logical unit.
    pub async fn writer_guard(&self) -> tokio::sync::MutexGuard<'_, SqliteConnection> {
        self.writer.lock().await
    }
}
