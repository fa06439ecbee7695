// OUI vendor-class lookup: resolves a manufacturer string (itself already
// resolved from the MAC's OUI by a collector or external OUI database) to a
// coarse device-type class. Not an OUI-to-vendor-name database itself —
// that lookup is assumed to have happened upstream; this only classifies
// the resulting vendor name.

use crate::types::DeviceType;

const SWITCH_ROUTER_VENDORS: &[&str] = &[
    "cisco", "juniper", "mikrotik", "ubiquiti", "netgear", "tp-link", "d-link",
    "huawei", "arista", "extreme networks", "brocade", "hpe", "hewlett packard enterprise",
];

const ACCESS_POINT_VENDORS: &[&str] = &["ruckus", "aruba", "meraki", "unifi"];

const PRINTER_VENDORS: &[&str] = &["hp inc", "canon", "epson", "brother", "lexmark", "xerox"];

const CAMERA_VENDORS: &[&str] = &["hikvision", "dahua", "axis communications", "reolink"];

const NAS_VENDORS: &[&str] = &["synology", "qnap", "western digital", "buffalo"];

const VM_VENDORS: &[&str] = &["vmware", "virtualbox", "qemu", "parallels", "xen"];

const MOBILE_VENDORS: &[&str] = &["apple", "samsung electronics", "google", "xiaomi", "oneplus"];

/// Resolves a vendor/manufacturer string to a coarse device class. Matching
/// is case-insensitive substring against a small set of well-known vendor
/// families; vendors absent from every list contribute no signal.
pub fn classify_vendor(manufacturer: &str) -> Option<DeviceType> {
    let m = manufacturer.to_ascii_lowercase();
    let any = |list: &[&str]| list.iter().any(|v| m.contains(v));

    if any(ACCESS_POINT_VENDORS) {
        Some(DeviceType::AccessPoint)
    } else if any(SWITCH_ROUTER_VENDORS) {
        Some(DeviceType::Switch)
    } else if any(PRINTER_VENDORS) {
        Some(DeviceType::Printer)
    } else if any(CAMERA_VENDORS) {
        Some(DeviceType::Camera)
    } else if any(NAS_VENDORS) {
        Some(DeviceType::Nas)
    } else if any(VM_VENDORS) {
        Some(DeviceType::Vm)
    } else if any(MOBILE_VENDORS) {
        Some(DeviceType::Mobile)
    } else {
        None
    }
}

/// True if `manufacturer` resolves to one of the vendor families treated as
/// network infrastructure by the enrich phase's OUI gate (spec.md §4.5:
/// "port-probe the infrastructure port set if OUI classification marks the
/// vendor as infrastructure").
pub fn is_infrastructure_vendor(manufacturer: &str) -> bool {
    matches!(
        classify_vendor(manufacturer),
        Some(DeviceType::Switch) | Some(DeviceType::Router) | Some(DeviceType::AccessPoint) | Some(DeviceType::Firewall)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vendor_families() {
        assert_eq!(classify_vendor("Cisco Systems, Inc."), Some(DeviceType::Switch));
        assert_eq!(classify_vendor("Ubiquiti Networks Inc."), Some(DeviceType::Switch));
        assert_eq!(classify_vendor("Hikvision Digital Technology"), Some(DeviceType::Camera));
        assert_eq!(classify_vendor("Synology Inc."), Some(DeviceType::Nas));
        assert_eq!(classify_vendor("VMware, Inc."), Some(DeviceType::Vm));
    }

    #[test]
    fn test_unknown_vendor_yields_none() {
        assert_eq!(classify_vendor("Totally Unknown Vendor LLC"), None);
    }

    #[test]
    fn test_infrastructure_gate() {
        assert!(is_infrastructure_vendor("Cisco Systems"));
        assert!(!is_infrastructure_vendor("Dell Inc."));
    }
}
