// Runtime configuration: a serde-deserializable `Config` loaded from a TOML
// file on disk and overridable with `RECONNET_*` environment variables,
// following the teacher's split between a typed config struct and a thin
// CLI layer that only knows how to locate and parse it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReconError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Minutes between scheduled scans.
    pub interval_minutes: u64,
    /// Quiet window start, "HH:MM" 24h local time. Ticks inside the window
    /// are skipped.
    pub quiet_start: Option<String>,
    pub quiet_end: Option<String>,
    pub subnet: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            enabled: false,
            interval_minutes: 60,
            quiet_start: None,
            quiet_end: None,
            subnet: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file.
    pub database_path: String,

    /// Overall per-host scan timeout, milliseconds.
    pub scan_timeout_ms: u64,
    /// Per-ICMP-probe timeout, milliseconds.
    pub ping_timeout_ms: u64,
    /// Number of ICMP echo requests sent per host.
    pub ping_count: u32,
    /// Maximum number of hosts probed concurrently.
    pub concurrency: usize,

    pub arp_enabled: bool,

    /// Seconds of silence after which an online device is marked offline.
    pub device_lost_after_secs: i64,

    pub mdns_enabled: bool,
    pub mdns_interval_secs: u64,

    pub upnp_enabled: bool,
    pub upnp_interval_secs: u64,

    pub snmp_enabled: bool,
    pub snmp_timeout_ms: u64,
    /// SNMP community strings / v3 credential ids tried in order per host.
    pub snmp_credentials: Vec<String>,

    pub portscan_enabled: bool,
    pub portscan_timeout_ms: u64,

    pub wifi_enabled: bool,
    pub wifi_interface: String,
    pub wifi_sync_interval_secs: u64,

    pub proxmox_enabled: bool,
    pub proxmox_url: Option<String>,
    pub proxmox_token_id: Option<String>,
    /// Vault credential id holding the `token_secret` field for `proxmox_token_id`.
    pub proxmox_credential_id: Option<String>,
    pub proxmox_sync_interval_secs: u64,

    /// Raw-metric retention window, days.
    pub metrics_retention_days: i64,

    pub schedule: ScheduleConfig,

    /// Version gate bypass for local development builds, mirrored from
    /// spec.md §4.1/§8's `dev`-version bypass.
    pub dev_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: "reconnet.db".to_string(),
            scan_timeout_ms: 5_000,
            ping_timeout_ms: 1_000,
            ping_count: 1,
            concurrency: 64,
            arp_enabled: true,
            device_lost_after_secs: 300,
            mdns_enabled: true,
            mdns_interval_secs: 60,
            upnp_enabled: true,
            upnp_interval_secs: 300,
            snmp_enabled: true,
            snmp_timeout_ms: 2_000,
            snmp_credentials: vec!["public".to_string()],
            portscan_enabled: true,
            portscan_timeout_ms: 500,
            wifi_enabled: true,
            wifi_interface: "wlan0".to_string(),
            wifi_sync_interval_secs: 60,
            proxmox_enabled: false,
            proxmox_url: None,
            proxmox_token_id: None,
            proxmox_credential_id: None,
            proxmox_sync_interval_secs: 300,
            metrics_retention_days: 60,
            schedule: ScheduleConfig::default(),
            dev_mode: false,
        }
    }
}

impl Config {
    /// Loads configuration from `path` (TOML), then applies any
    /// `RECONNET_`-prefixed environment overrides on top.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let mut cfg = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ReconError::StoreQuery(format!("reading {}: {e}", path.display())))?;
            toml_like::parse(&text)?
        } else {
            Config::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        macro_rules! env_str {
            ($field:expr, $key:expr) => {
                if let Ok(v) = std::env::var($key) {
                    $field = Some(v);
                }
            };
        }
        macro_rules! env_parse {
            ($field:expr, $key:expr) => {
                if let Ok(v) = std::env::var($key) {
                    if let Ok(parsed) = v.parse() {
                        $field = parsed;
                    }
                }
            };
        }

        if let Ok(v) = std::env::var("RECONNET_DATABASE_PATH") {
            self.database_path = v;
        }
        env_parse!(self.scan_timeout_ms, "RECONNET_SCAN_TIMEOUT_MS");
        env_parse!(self.ping_timeout_ms, "RECONNET_PING_TIMEOUT_MS");
        env_parse!(self.ping_count, "RECONNET_PING_COUNT");
        env_parse!(self.concurrency, "RECONNET_CONCURRENCY");
        env_parse!(self.arp_enabled, "RECONNET_ARP_ENABLED");
        env_parse!(self.device_lost_after_secs, "RECONNET_DEVICE_LOST_AFTER_SECS");
        env_parse!(self.mdns_enabled, "RECONNET_MDNS_ENABLED");
        env_parse!(self.upnp_enabled, "RECONNET_UPNP_ENABLED");
        env_parse!(self.snmp_enabled, "RECONNET_SNMP_ENABLED");
        env_parse!(self.portscan_enabled, "RECONNET_PORTSCAN_ENABLED");
        env_parse!(self.wifi_enabled, "RECONNET_WIFI_ENABLED");
        if let Ok(v) = std::env::var("RECONNET_WIFI_INTERFACE") {
            self.wifi_interface = v;
        }
        env_parse!(self.proxmox_enabled, "RECONNET_PROXMOX_ENABLED");
        env_str!(self.proxmox_url, "RECONNET_PROXMOX_URL");
        env_str!(self.proxmox_token_id, "RECONNET_PROXMOX_TOKEN_ID");
        env_str!(self.proxmox_credential_id, "RECONNET_PROXMOX_CREDENTIAL_ID");
        env_parse!(self.metrics_retention_days, "RECONNET_METRICS_RETENTION_DAYS");
        env_parse!(self.dev_mode, "RECONNET_DEV_MODE");
    }
}

/// Accepts either TOML or JSON on disk, trying JSON first since it's the
/// stricter format and fails fast on non-JSON input.
mod toml_like {
    use super::Config;
    use crate::error::{ReconError, Result};

    pub fn parse(text: &str) -> Result<Config> {
        if let Ok(cfg) = serde_json::from_str::<Config>(text) {
            return Ok(cfg);
        }
        toml::from_str(text).map_err(|e| ReconError::StoreQuery(format!("parsing config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.database_path, "reconnet.db");
        assert!(cfg.arp_enabled);
        assert_eq!(cfg.metrics_retention_days, 60);
        assert!(!cfg.schedule.enabled);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let cfg = Config::load("/nonexistent/path/reconnet.toml").unwrap();
        assert_eq!(cfg.database_path, "reconnet.db");
    }

    #[test]
    fn test_json_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconnet.json");
        std::fs::write(&path, r#"{"database_path": "custom.db", "concurrency": 8}"#).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.database_path, "custom.db");
        assert_eq!(cfg.concurrency, 8);
    }
}
