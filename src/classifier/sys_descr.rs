// sysDescr keyword classification: case-insensitive substring match in
// priority order (spec.md §6).

use crate::types::DeviceType;

const ROUTER_KEYWORDS: &[&str] = &["router", "routeros", "mikrotik"];
const SWITCH_KEYWORDS: &[&str] = &["switch", "catalyst", "procurve", "edgeswitch", "layer 2", "bridge"];
const AP_KEYWORDS: &[&str] = &["access point", "wireless", "unifi ap", "airmax", "airos"];
const FIREWALL_KEYWORDS: &[&str] = &["firewall", "pfsense", "opnsense", "fortigate", "sophos"];
const PRINTER_KEYWORDS: &[&str] = &["printer", "laserjet", "inkjet"];
const NAS_KEYWORDS: &[&str] = &["nas", "synology", "qnap", "storage"];
const SERVER_KEYWORDS: &[&str] = &["linux", "windows", "freebsd", "esxi", "proxmox"];

/// Classifies a sysDescr string by substring keyword match, in the priority
/// order spec.md §6 specifies: router, switch, access point, firewall,
/// printer, nas, server.
pub fn classify_keyword(descr: &str) -> Option<DeviceType> {
    let d = descr.to_ascii_lowercase();
    let any = |list: &[&str]| list.iter().any(|k| d.contains(k));

    if any(ROUTER_KEYWORDS) {
        Some(DeviceType::Router)
    } else if any(SWITCH_KEYWORDS) {
        Some(DeviceType::Switch)
    } else if any(AP_KEYWORDS) {
        Some(DeviceType::AccessPoint)
    } else if any(FIREWALL_KEYWORDS) {
        Some(DeviceType::Firewall)
    } else if any(PRINTER_KEYWORDS) {
        Some(DeviceType::Printer)
    } else if any(NAS_KEYWORDS) {
        Some(DeviceType::Nas)
    } else if any(SERVER_KEYWORDS) {
        Some(DeviceType::Server)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_keyword() {
        assert_eq!(classify_keyword("MikroTik RouterOS 7.1"), Some(DeviceType::Router));
    }

    #[test]
    fn test_switch_keyword_priority_over_server() {
        // Contains "linux" (server keyword) but "catalyst" (switch) should
        // still win since switch is checked first.
        assert_eq!(
            classify_keyword("Cisco Catalyst 2960, Linux-based management"),
            Some(DeviceType::Switch)
        );
    }

    #[test]
    fn test_no_keyword_match() {
        assert_eq!(classify_keyword("Unidentified device v1.0"), None);
    }
}
