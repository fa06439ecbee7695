// LLDP collector: walks `lldpRemTable`/`lldpRemManAddrTable` over the same
// SNMP session machinery as `collectors::snmp`, correlating rows by their
// composite index (`timeMark.localPortNum.index`) into per-neighbor
// capability and address records.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ReconError, Result};

use super::snmp::Credential;

pub const OID_LLDP_REM_SYS_DESC: &[u32] = &[1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 10];
pub const OID_LLDP_REM_PORT_ID: &[u32] = &[1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 7];
pub const OID_LLDP_REM_PORT_DESC: &[u32] = &[1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 8];
pub const OID_LLDP_REM_SYS_NAME: &[u32] = &[1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 9];
pub const OID_LLDP_REM_CAP_SUPPORTED: &[u32] = &[1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 11];
pub const OID_LLDP_REM_CAP_ENABLED: &[u32] = &[1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 12];
pub const OID_LLDP_REM_MAN_ADDR_TABLE: &[u32] = &[1, 0, 8802, 1, 1, 2, 1, 4, 2, 1];

pub const CAP_OTHER: u16 = 0x01;
pub const CAP_REPEATER: u16 = 0x02;
pub const CAP_BRIDGE: u16 = 0x04;
pub const CAP_WLAN_ACCESS_POINT: u16 = 0x08;
pub const CAP_ROUTER: u16 = 0x10;
pub const CAP_TELEPHONE: u16 = 0x20;
pub const CAP_DOCSIS: u16 = 0x40;
pub const CAP_STATION_ONLY: u16 = 0x80;

#[derive(Debug, Clone, Default)]
pub struct LldpNeighbor {
    /// `timeMark.localPortNum.index`, the composite key every column shares.
    pub index: (u32, u32, u32),
    pub sys_desc: Option<String>,
    pub port_id: Option<String>,
    pub port_desc: Option<String>,
    pub sys_name: Option<String>,
    pub cap_supported: Option<u16>,
    pub cap_enabled: Option<u16>,
    pub man_addr: Option<String>,
    /// Best-effort MAC derived from `port_id` when its subtype is
    /// `macAddress` (7 colon/hex bytes) — LLDP-MED switches commonly encode
    /// the neighbor's MAC directly in the port ID TLV.
    pub port_id_as_mac: Option<String>,
}

pub fn available() -> bool {
    true
}

/// Walks the remote-systems table and its management-address table,
/// correlating rows into one `LldpNeighbor` per composite index. A session
/// failure surfaces as an empty neighbor list rather than propagating —
/// LLDP is best-effort enrichment, not a required signal.
pub async fn enumerate(target: SocketAddr, credential: Credential, timeout: Duration) -> Vec<LldpNeighbor> {
    match walk_lldp(target, credential, timeout).await {
        Ok(neighbors) => neighbors,
        Err(_) => Vec::new(),
    }
}

async fn walk_lldp(target: SocketAddr, credential: Credential, timeout: Duration) -> Result<Vec<LldpNeighbor>> {
    tokio::task::spawn_blocking(move || walk_lldp_blocking(target, credential, timeout))
        .await
        .map_err(|e| ReconError::CollectorProtocol {
            collector: "lldp",
            target: target.to_string(),
            detail: format!("blocking task join error: {e}"),
        })?
}

fn walk_lldp_blocking(target: SocketAddr, credential: Credential, timeout: Duration) -> Result<Vec<LldpNeighbor>> {
    let session_target = target;
    let mut by_index: HashMap<(u32, u32, u32), LldpNeighbor> = HashMap::new();

    let columns: &[(&[u32], Column)] = &[
        (OID_LLDP_REM_SYS_DESC, Column::SysDesc),
        (OID_LLDP_REM_PORT_ID, Column::PortId),
        (OID_LLDP_REM_PORT_DESC, Column::PortDesc),
        (OID_LLDP_REM_SYS_NAME, Column::SysName),
        (OID_LLDP_REM_CAP_SUPPORTED, Column::CapSupported),
        (OID_LLDP_REM_CAP_ENABLED, Column::CapEnabled),
    ];

    for (base, column) in columns {
        let rows = super::snmp::bulk_walk_raw(session_target, &credential, timeout, base).map_err(|e| {
            ReconError::CollectorProtocol {
                collector: "lldp",
                target: target.to_string(),
                detail: e.to_string(),
            }
        })?;
        for (oid, value) in rows {
            let Some(index) = composite_index(&oid) else { continue };
            let entry = by_index.entry(index).or_insert_with(|| LldpNeighbor { index, ..Default::default() });
            apply_column(entry, *column, value);
        }
    }

    // Management-address table carries an extended index
    // (timeMark.localPortNum.addrSubtype.addr...); correlate on its
    // timeMark/localPortNum prefix rather than its own trailing octets.
    if let Ok(rows) = super::snmp::bulk_walk_raw(session_target, &credential, timeout, OID_LLDP_REM_MAN_ADDR_TABLE) {
        for (oid, value) in rows {
            if let Some((time_mark, port_num)) = man_addr_prefix(&oid) {
                if let Some(addr) = value.as_ip_string() {
                    for neighbor in by_index.values_mut() {
                        if neighbor.index.0 == time_mark && neighbor.index.1 == port_num {
                            neighbor.man_addr = Some(addr.clone());
                        }
                    }
                }
            }
        }
    }

    let mut neighbors: Vec<LldpNeighbor> = by_index.into_values().collect();
    for n in &mut neighbors {
        n.port_id_as_mac = n.port_id.as_deref().and_then(port_id_to_mac);
    }
    neighbors.sort_by_key(|n| n.index);
    Ok(neighbors)
}

#[derive(Clone, Copy)]
enum Column {
    SysDesc,
    PortId,
    PortDesc,
    SysName,
    CapSupported,
    CapEnabled,
}

fn apply_column(entry: &mut LldpNeighbor, column: Column, value: super::snmp::RawValue) {
    match column {
        Column::SysDesc => entry.sys_desc = value.as_string(),
        Column::PortId => entry.port_id = value.as_string().or_else(|| value.as_mac_string()),
        Column::PortDesc => entry.port_desc = value.as_string(),
        Column::SysName => entry.sys_name = value.as_string(),
        Column::CapSupported => entry.cap_supported = value.as_u16_bitmap(),
        Column::CapEnabled => entry.cap_enabled = value.as_u16_bitmap(),
    }
}

/// Extracts the `(timeMark, localPortNum, index)` prefix shared by every
/// `lldpRemTable` column: the last three OID components after the fixed
/// table/column prefix.
fn composite_index(oid: &[u32]) -> Option<(u32, u32, u32)> {
    if oid.len() < 3 {
        return None;
    }
    let n = oid.len();
    Some((oid[n - 3], oid[n - 2], oid[n - 1]))
}

/// `lldpRemManAddrTable`'s index is `timeMark.localPortNum.index.addrSubtype.addrLen.addr...`;
/// only the first two components are needed for correlation.
fn man_addr_prefix(oid: &[u32]) -> Option<(u32, u32)> {
    if oid.len() < 2 {
        return None;
    }
    // The fixed table prefix length varies by whether OIDs came back with
    // or without the column arc; take the two components following the
    // shared `lldpRemManAddrTable` base length.
    let base_len = OID_LLDP_REM_MAN_ADDR_TABLE.len() + 1; // + column arc
    if oid.len() <= base_len + 1 {
        return None;
    }
    Some((oid[base_len], oid[base_len + 1]))
}

/// Interprets a `portId` TLV as a MAC address when it already looks like
/// one (6 colon-separated hex octets) — the common case for switches that
/// report `macAddress` subtype port IDs.
fn port_id_to_mac(port_id: &str) -> Option<String> {
    let parts: Vec<&str> = port_id.split(':').collect();
    if parts.len() == 6 && parts.iter().all(|p| p.len() == 2 && u8::from_str_radix(p, 16).is_ok()) {
        Some(port_id.to_ascii_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_index_extracts_trailing_triple() {
        let oid = [1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 10, 5, 3, 17];
        assert_eq!(composite_index(&oid), Some((5, 3, 17)));
    }

    #[test]
    fn test_port_id_to_mac_recognizes_colon_hex() {
        assert_eq!(port_id_to_mac("AA:BB:CC:DD:EE:FF"), Some("aa:bb:cc:dd:ee:ff".to_string()));
        assert_eq!(port_id_to_mac("GigabitEthernet0/1"), None);
    }

    #[test]
    fn test_cap_bit_constants_are_disjoint() {
        let all = [CAP_OTHER, CAP_REPEATER, CAP_BRIDGE, CAP_WLAN_ACCESS_POINT, CAP_ROUTER, CAP_TELEPHONE, CAP_DOCSIS, CAP_STATION_ONLY];
        let mut seen = 0u16;
        for bit in all {
            assert_eq!(seen & bit, 0);
            seen |= bit;
        }
    }
}
