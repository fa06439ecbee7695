// WiFi-AP client-snapshot rows, one per observation (no upsert: each scan
// cycle appends a fresh snapshot, letting signal/throughput history accumulate).

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{Result, StoreErrorContext};

#[derive(Debug, Clone)]
pub struct WifiClientSnapshot {
    pub device_id: Option<Uuid>,
    pub client_mac: String,
    pub signal_dbm: Option<i32>,
    pub signal_avg_dbm: Option<i32>,
    pub connected_secs: Option<i64>,
    pub inactive_ms: Option<i64>,
    pub rx_bitrate_kbps: Option<i64>,
    pub tx_bitrate_kbps: Option<i64>,
    pub rx_bytes: Option<i64>,
    pub tx_bytes: Option<i64>,
    pub ap_bssid: Option<String>,
    pub ap_ssid: Option<String>,
}

impl super::Store {
    pub async fn insert_wifi_snapshot(&self, snap: &WifiClientSnapshot) -> Result<()> {
        let mut w = self.writer_guard().await;
        sqlx::query(
            r#"INSERT INTO recon_wifi_clients (
                device_id, client_mac, signal_dbm, signal_avg_dbm, connected_secs, inactive_ms,
                rx_bitrate_kbps, tx_bitrate_kbps, rx_bytes, tx_bytes, ap_bssid, ap_ssid, observed_at
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?)"#,
        )
        .bind(snap.device_id.map(|i| i.to_string()))
        .bind(&snap.client_mac)
        .bind(snap.signal_dbm)
        .bind(snap.signal_avg_dbm)
        .bind(snap.connected_secs)
        .bind(snap.inactive_ms)
        .bind(snap.rx_bitrate_kbps)
        .bind(snap.tx_bitrate_kbps)
        .bind(snap.rx_bytes)
        .bind(snap.tx_bytes)
        .bind(&snap.ap_bssid)
        .bind(&snap.ap_ssid)
        .bind(Utc::now())
        .execute(&mut *w)
        .await
        .write_context("insert_wifi_snapshot")?;
        Ok(())
    }

    pub async fn list_wifi_snapshots_for_device(&self, device_id: Uuid) -> Result<Vec<WifiClientSnapshot>> {
        let rows = sqlx::query(
            "SELECT * FROM recon_wifi_clients WHERE device_id = ? ORDER BY observed_at DESC",
        )
        .bind(device_id.to_string())
        .fetch_all(&self.pool)
        .await
        .query_context("list_wifi_snapshots_for_device")?;
        rows.iter()
            .map(|row| {
                Ok(WifiClientSnapshot {
                    device_id: Some(device_id),
                    client_mac: row.try_get("client_mac")?,
                    signal_dbm: row.try_get("signal_dbm")?,
                    signal_avg_dbm: row.try_get("signal_avg_dbm")?,
                    connected_secs: row.try_get("connected_secs")?,
                    inactive_ms: row.try_get("inactive_ms")?,
                    rx_bitrate_kbps: row.try_get("rx_bitrate_kbps")?,
                    tx_bitrate_kbps: row.try_get("tx_bitrate_kbps")?,
                    rx_bytes: row.try_get("rx_bytes")?,
                    tx_bytes: row.try_get("tx_bytes")?,
                    ap_bssid: row.try_get("ap_bssid")?,
                    ap_ssid: row.try_get("ap_ssid")?,
                })
            })
            .collect()
    }
}
