// Shared domain types: the Device record and the small enumerations used
// across the store, identity engine, classifier and orchestrator.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Router,
    Switch,
    AccessPoint,
    Firewall,
    Server,
    Desktop,
    Mobile,
    Phone,
    Printer,
    Nas,
    Iot,
    Camera,
    Vm,
    Unknown,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Unknown
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceType::Router => "router",
            DeviceType::Switch => "switch",
            DeviceType::AccessPoint => "access_point",
            DeviceType::Firewall => "firewall",
            DeviceType::Server => "server",
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Phone => "phone",
            DeviceType::Printer => "printer",
            DeviceType::Nas => "nas",
            DeviceType::Iot => "iot",
            DeviceType::Camera => "camera",
            DeviceType::Vm => "vm",
            DeviceType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for DeviceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "router" => DeviceType::Router,
            "switch" => DeviceType::Switch,
            "access_point" => DeviceType::AccessPoint,
            "firewall" => DeviceType::Firewall,
            "server" => DeviceType::Server,
            "desktop" => DeviceType::Desktop,
            "mobile" => DeviceType::Mobile,
            "phone" => DeviceType::Phone,
            "printer" => DeviceType::Printer,
            "nas" => DeviceType::Nas,
            "iot" => DeviceType::Iot,
            "camera" => DeviceType::Camera,
            "vm" => DeviceType::Vm,
            _ => DeviceType::Unknown,
        })
    }
}

/// `DeviceType` discriminant used only to break classifier aggregate ties
/// deterministically (see `classifier::classify`).
pub fn device_type_rank(t: DeviceType) -> u8 {
    match t {
        DeviceType::AccessPoint => 0,
        DeviceType::Camera => 1,
        DeviceType::Desktop => 2,
        DeviceType::Firewall => 3,
        DeviceType::Iot => 4,
        DeviceType::Mobile => 5,
        DeviceType::Nas => 6,
        DeviceType::Phone => 7,
        DeviceType::Printer => 8,
        DeviceType::Router => 9,
        DeviceType::Server => 10,
        DeviceType::Switch => 11,
        DeviceType::Vm => 12,
        DeviceType::Unknown => 13,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unknown,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for DeviceStatus {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "online" => DeviceStatus::Online,
            "offline" => DeviceStatus::Offline,
            _ => DeviceStatus::Unknown,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Icmp,
    Arp,
    Snmp,
    Mdns,
    Upnp,
    Wifi,
    Proxmox,
    Manual,
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryMethod::Icmp => "icmp",
            DiscoveryMethod::Arp => "arp",
            DiscoveryMethod::Snmp => "snmp",
            DiscoveryMethod::Mdns => "mdns",
            DiscoveryMethod::Upnp => "upnp",
            DiscoveryMethod::Wifi => "wifi",
            DiscoveryMethod::Proxmox => "proxmox",
            DiscoveryMethod::Manual => "manual",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for DiscoveryMethod {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "icmp" => DiscoveryMethod::Icmp,
            "arp" => DiscoveryMethod::Arp,
            "snmp" => DiscoveryMethod::Snmp,
            "mdns" => DiscoveryMethod::Mdns,
            "upnp" => DiscoveryMethod::Upnp,
            "wifi" => DiscoveryMethod::Wifi,
            "proxmox" => DiscoveryMethod::Proxmox,
            _ => DiscoveryMethod::Manual,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Wired,
    Wifi,
    Unknown,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionType::Wired => "wired",
            ConnectionType::Wifi => "wifi",
            ConnectionType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ConnectionType {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "wired" => ConnectionType::Wired,
            "wifi" => ConnectionType::Wifi,
            _ => ConnectionType::Unknown,
        })
    }
}

/// Short labels identifying which signal produced a device's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Manual,
    OuiVendor,
    SnmpBridgeMib,
    SnmpSysServices,
    SnmpSysDescr,
    LldpCaps,
    PortFingerprint,
    TtlHint,
    UpnpDeviceType,
    MdnsService,
    WifiAp,
    None,
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassificationSource::Manual => "manual",
            ClassificationSource::OuiVendor => "oui_vendor",
            ClassificationSource::SnmpBridgeMib => "snmp_bridge_mib",
            ClassificationSource::SnmpSysServices => "snmp_sys_services",
            ClassificationSource::SnmpSysDescr => "snmp_sys_descr",
            ClassificationSource::LldpCaps => "lldp_caps",
            ClassificationSource::PortFingerprint => "port_fingerprint",
            ClassificationSource::TtlHint => "ttl_hint",
            ClassificationSource::UpnpDeviceType => "upnp_device_type",
            ClassificationSource::MdnsService => "mdns_service",
            ClassificationSource::WifiAp => "wifi_ap",
            ClassificationSource::None => "none",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ClassificationSource {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "manual" => ClassificationSource::Manual,
            "oui_vendor" => ClassificationSource::OuiVendor,
            "snmp_bridge_mib" => ClassificationSource::SnmpBridgeMib,
            "snmp_sys_services" => ClassificationSource::SnmpSysServices,
            "snmp_sys_descr" => ClassificationSource::SnmpSysDescr,
            "lldp_caps" => ClassificationSource::LldpCaps,
            "port_fingerprint" => ClassificationSource::PortFingerprint,
            "ttl_hint" => ClassificationSource::TtlHint,
            "upnp_device_type" => ClassificationSource::UpnpDeviceType,
            "mdns_service" => ClassificationSource::MdnsService,
            "wifi_ap" => ClassificationSource::WifiAp,
            _ => ClassificationSource::None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => ScanStatus::Pending,
            "running" => ScanStatus::Running,
            "completed" => ScanStatus::Completed,
            _ => ScanStatus::Failed,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Arp,
    Fdb,
    Lldp,
    Wifi,
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkType::Arp => "arp",
            LinkType::Fdb => "fdb",
            LinkType::Lldp => "lldp",
            LinkType::Wifi => "wifi",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for LinkType {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "arp" => LinkType::Arp,
            "fdb" => LinkType::Fdb,
            "lldp" => LinkType::Lldp,
            _ => LinkType::Wifi,
        })
    }
}

/// A single piece of evidence the classifier fused into a `device_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationSignal {
    pub source: ClassificationSource,
    pub device_type: DeviceType,
    pub weight: u32,
    pub detail: String,
}

/// The central entity: an observed/tracked network device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub mac_address: Option<String>,
    pub ip_addresses: Vec<String>,
    pub hostname: Option<String>,

    pub device_type: DeviceType,
    pub classification_confidence: u8,
    pub classification_source: ClassificationSource,
    pub classification_signals: Vec<ClassificationSignal>,

    pub status: DeviceStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,

    pub discovery_method: DiscoveryMethod,
    pub agent_id: Option<String>,

    pub manufacturer: Option<String>,
    pub os: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub primary_role: Option<String>,
    pub owner: Option<String>,
    pub notes: Option<String>,
    pub tags: HashSet<String>,
    pub custom_fields: BTreeMap<String, String>,

    pub parent_device_id: Option<Uuid>,
    pub network_layer: i32,
    pub connection_type: ConnectionType,
}

impl Device {
    /// A device skeleton carrying only identity-resolution fields, used to
    /// build an upsert candidate before the merge rules run.
    pub fn candidate() -> DeviceBuilder {
        DeviceBuilder::default()
    }
}

/// Builder for an upsert candidate. Only fields actually observed by a
/// collector are set; everything else stays `None`/empty so the merge rules
/// in `identity::upsert_device` can distinguish "not observed" from "empty".
#[derive(Debug, Clone, Default)]
pub struct DeviceBuilder {
    pub mac_address: Option<String>,
    pub ip_addresses: Vec<String>,
    pub hostname: Option<String>,
    pub device_type: Option<DeviceType>,
    pub classification_confidence: Option<u8>,
    pub classification_source: Option<ClassificationSource>,
    pub classification_signals: Vec<ClassificationSignal>,
    pub discovery_method: Option<DiscoveryMethod>,
    pub agent_id: Option<String>,
    pub manufacturer: Option<String>,
    pub os: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub primary_role: Option<String>,
    pub owner: Option<String>,
    pub notes: Option<String>,
    pub tags: HashSet<String>,
}

impl DeviceBuilder {
    pub fn mac(mut self, mac: impl Into<String>) -> Self {
        self.mac_address = Some(mac.into());
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_addresses.push(ip.into());
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn discovery_method(mut self, m: DiscoveryMethod) -> Self {
        self.discovery_method = Some(m);
        self
    }

    pub fn manufacturer(mut self, m: impl Into<String>) -> Self {
        self.manufacturer = Some(m.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: Uuid,
    pub subnet: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: ScanStatus,
    pub total: i32,
    pub online: i32,
    pub error_msg: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanMetrics {
    pub id: i64,
    pub scan_id: Uuid,
    pub duration_ms: i64,
    pub ping_ms: i64,
    pub enrich_ms: i64,
    pub post_process_ms: i64,
    pub hosts_scanned: i32,
    pub hosts_alive: i32,
    pub devices_created: i32,
    pub devices_updated: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregatePeriod {
    Weekly,
    Monthly,
}

impl fmt::Display for AggregatePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregatePeriod::Weekly => f.write_str("weekly"),
            AggregatePeriod::Monthly => f.write_str("monthly"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetricsAggregate {
    pub id: i64,
    pub period: AggregatePeriod,
    pub period_start: DateTime<Utc>,
    pub scan_count: i32,
    pub avg_duration_ms: f64,
    pub avg_hosts_scanned: f64,
    pub avg_hosts_alive: f64,
    pub max_devices_found: i32,
    pub min_devices_found: i32,
    pub failed_scans: i32,
    pub total_new_devices: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyLink {
    pub id: i64,
    pub source_device_id: Uuid,
    pub target_device_id: Uuid,
    pub link_type: LinkType,
    pub last_confirmed: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMovement {
    pub id: i64,
    pub port: i32,
    pub protocol: String,
    pub service_name: String,
    pub from_device_id: Uuid,
    pub to_device_id: Uuid,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceHistoryEntry {
    pub id: i64,
    pub device_id: Uuid,
    pub old_status: DeviceStatus,
    pub new_status: DeviceStatus,
    pub changed_at: DateTime<Utc>,
}

/// Confidence tiers exposed for consumer reporting (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Identified,
    Probable,
    Unknown,
}

pub fn confidence_tier(confidence: u8) -> ConfidenceTier {
    match confidence {
        50..=100 => ConfidenceTier::Identified,
        25..=49 => ConfidenceTier::Probable,
        _ => ConfidenceTier::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(confidence_tier(100), ConfidenceTier::Identified);
        assert_eq!(confidence_tier(50), ConfidenceTier::Identified);
        assert_eq!(confidence_tier(49), ConfidenceTier::Probable);
        assert_eq!(confidence_tier(25), ConfidenceTier::Probable);
        assert_eq!(confidence_tier(24), ConfidenceTier::Unknown);
        assert_eq!(confidence_tier(0), ConfidenceTier::Unknown);
    }

    #[test]
    fn test_device_type_round_trip() {
        for t in [
            DeviceType::Router,
            DeviceType::Switch,
            DeviceType::AccessPoint,
            DeviceType::Nas,
            DeviceType::Unknown,
        ] {
            let s = t.to_string();
            let parsed: DeviceType = s.parse().unwrap();
            assert_eq!(parsed, t);
        }
    }
}
