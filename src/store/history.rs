// Append-only device status-history log.

use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::error::{ReconError, Result, StoreErrorContext};
use crate::types::{DeviceHistoryEntry, DeviceStatus};

use super::Store;

impl Store {
    /// Appends a status-change row. Callers are expected to have already
    /// checked `old_status != new_status`; the store does not enforce it so
    /// a caller bug surfaces as a duplicate-looking row rather than a silent
    /// drop.
    pub async fn record_status_change(
        &self,
        conn: &mut SqliteConnection,
        device_id: Uuid,
        old_status: DeviceStatus,
        new_status: DeviceStatus,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO recon_device_history (device_id, old_status, new_status, changed_at) VALUES (?,?,?,?)",
        )
        .bind(device_id.to_string())
        .bind(old_status.to_string())
        .bind(new_status.to_string())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .write_context("record_status_change")?;
        Ok(())
    }

    pub async fn list_history_for_device(&self, device_id: Uuid) -> Result<Vec<DeviceHistoryEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM recon_device_history WHERE device_id = ? ORDER BY changed_at",
        )
        .bind(device_id.to_string())
        .fetch_all(&self.pool)
        .await
        .query_context("list_history_for_device")?;
        rows.iter()
            .map(|row| {
                Ok(DeviceHistoryEntry {
                    id: row.try_get("id")?,
                    device_id: Uuid::parse_str(&row.try_get::<String, _>("device_id")?)
                        .map_err(|e| ReconError::StoreQuery(e.to_string()))?,
                    old_status: row.try_get::<String, _>("old_status")?.parse().unwrap_or(DeviceStatus::Unknown),
                    new_status: row.try_get::<String, _>("new_status")?.parse().unwrap_or(DeviceStatus::Unknown),
                    changed_at: row.try_get("changed_at")?,
                })
            })
            .collect()
    }
}
